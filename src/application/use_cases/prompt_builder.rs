use crate::domain::query::Identity;
use crate::domain::schema::WhitelistSchema;

/// Builds the instruction text sent to the remote generator.
///
/// The generator only ever sees the whitelisted schema, and is told to scope
/// results to the caller through the `$1` placeholder, which the gateway binds.
pub fn build_sql_prompt(request: &str, identity: &Identity, schema: &WhitelistSchema) -> String {
    format!(
        r#"IMPORTANT INSTRUCTIONS:
1. You translate a shop customer's request into exactly ONE PostgreSQL SELECT statement.
2. Return ONLY the SQL statement: no explanations, no comments, no markdown, no code fences.
3. Read-only: never use INSERT, UPDATE, DELETE, DROP, ALTER, TRUNCATE, CREATE or GRANT.
4. Do not end the statement with a semicolon.
5. Use ONLY these tables and columns:
{schema}
6. The request comes from customer {identity}. Always restrict results to this customer with `customer_id = $1` (the value of $1 is bound separately; never write it literally). Product listings need no customer filter.
7. Add LIMIT 50 to queries that can return many rows.

User request: "{request}"

SQL:"#,
        schema = schema.describe(),
        identity = identity,
        request = request.trim().replace('"', "'"),
    )
}
