//! Intent Matcher for common requests
//!
//! Recognizes a handful of frequent asks (sales totals, today's orders, my
//! orders, product listing) and answers them with fixed SQL, skipping the
//! remote generator. Cue detection is keyword containment over the
//! lower-cased prompt in English, Hindi, Marathi and Gujarati; a miss simply
//! falls through to generation.

use crate::domain::query::{GeneratedQuery, Identity};

const MONTH_CUES: &[&str] = &["month", "महीने", "महीना", "माह", "महिन्या", "महिना", "મહિન"];
const WEEK_CUES: &[&str] = &["week", "हफ्ते", "हफ़्ते", "हफ्ता", "सप्ताह", "आठवड", "અઠવાડ"];
const SALES_CUES: &[&str] = &[
    "sale", "revenue", "total", "बिक्री", "कुल", "विक्री", "एकूण", "વેચાણ", "કુલ",
];
const TODAY_CUES: &[&str] = &["today", "आज", "આજ"];
const ORDER_CUES: &[&str] = &["order", "ऑर्डर", "आर्डर", "ઓર્ડર"];
const PRODUCT_CUES: &[&str] = &["product", "उत्पाद", "प्रोडक्ट", "ઉત્પાદ", "પ્રોડક્ટ"];

pub const DUAL_SALES_SQL: &str = "SELECT COALESCE(SUM(amount) FILTER (WHERE created_at >= date_trunc('month', CURRENT_DATE)), 0) AS monthly_sales, COALESCE(SUM(amount) FILTER (WHERE created_at >= date_trunc('week', CURRENT_DATE)), 0) AS weekly_sales FROM orders WHERE customer_id = $1";
pub const MONTHLY_SALES_SQL: &str = "SELECT COALESCE(SUM(amount), 0) AS monthly_sales FROM orders WHERE customer_id = $1 AND created_at >= date_trunc('month', CURRENT_DATE)";
pub const WEEKLY_SALES_SQL: &str = "SELECT COALESCE(SUM(amount), 0) AS weekly_sales FROM orders WHERE customer_id = $1 AND created_at >= date_trunc('week', CURRENT_DATE)";
pub const TOTAL_SALES_SQL: &str =
    "SELECT COALESCE(SUM(amount), 0) AS total_sales FROM orders WHERE customer_id = $1";
pub const TODAY_ORDERS_SQL: &str = "SELECT * FROM orders WHERE customer_id = $1 AND created_at::date = CURRENT_DATE ORDER BY created_at DESC";
pub const MY_ORDERS_SQL: &str =
    "SELECT * FROM orders WHERE customer_id = $1 ORDER BY created_at DESC LIMIT 50";
pub const PRODUCT_LIST_SQL: &str = "SELECT id, title, sku, price, inventory_quantity FROM products WHERE status = 'active' ORDER BY title ASC LIMIT 50";

/// Conservative answer used when generation fails and nothing matched.
pub const DEFAULT_ORDERS_SQL: &str =
    "SELECT * FROM orders WHERE customer_id = $1 ORDER BY created_at DESC LIMIT 10";

/// Which cue families appear in a prompt.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntentCues {
    pub month: bool,
    pub week: bool,
    pub sales: bool,
    pub today: bool,
    pub order: bool,
    pub product: bool,
}

impl IntentCues {
    pub fn detect(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        let has = |cues: &[&str]| cues.iter().any(|cue| lower.contains(cue));
        Self {
            month: has(MONTH_CUES),
            week: has(WEEK_CUES),
            sales: has(SALES_CUES),
            today: has(TODAY_CUES),
            order: has(ORDER_CUES),
            product: has(PRODUCT_CUES),
        }
    }
}

/// One row of the rule table: when `applies` holds, answer with `sql`.
#[derive(Debug, Clone, Copy)]
pub struct IntentRule {
    pub name: &'static str,
    pub applies: fn(&IntentCues) -> bool,
    pub sql: &'static str,
}

fn month_and_week_sales(c: &IntentCues) -> bool {
    c.sales && c.month && c.week
}

fn month_sales(c: &IntentCues) -> bool {
    c.sales && c.month && !c.week
}

fn week_sales(c: &IntentCues) -> bool {
    c.sales && c.week && !c.month
}

fn total_sales(c: &IntentCues) -> bool {
    c.sales && !c.month && !c.week
}

fn today_orders(c: &IntentCues) -> bool {
    c.today && c.order
}

fn my_orders(c: &IntentCues) -> bool {
    c.order && !c.today
}

fn product_list(c: &IntentCues) -> bool {
    c.product
}

/// Evaluated top to bottom; the first applicable rule wins.
pub const DEFAULT_RULES: &[IntentRule] = &[
    IntentRule {
        name: "monthly_and_weekly_sales",
        applies: month_and_week_sales,
        sql: DUAL_SALES_SQL,
    },
    IntentRule {
        name: "monthly_sales",
        applies: month_sales,
        sql: MONTHLY_SALES_SQL,
    },
    IntentRule {
        name: "weekly_sales",
        applies: week_sales,
        sql: WEEKLY_SALES_SQL,
    },
    IntentRule {
        name: "total_sales",
        applies: total_sales,
        sql: TOTAL_SALES_SQL,
    },
    IntentRule {
        name: "today_orders",
        applies: today_orders,
        sql: TODAY_ORDERS_SQL,
    },
    IntentRule {
        name: "my_orders",
        applies: my_orders,
        sql: MY_ORDERS_SQL,
    },
    IntentRule {
        name: "product_list",
        applies: product_list,
        sql: PRODUCT_LIST_SQL,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct IntentMatch {
    pub intent: &'static str,
    pub query: GeneratedQuery,
}

pub struct IntentMatcher {
    rules: Vec<IntentRule>,
}

impl IntentMatcher {
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.to_vec(),
        }
    }

    /// Appends a rule after the built-in ones.
    pub fn with_rule(mut self, rule: IntentRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn match_prompt(&self, prompt: &str, identity: &Identity) -> Option<IntentMatch> {
        let cues = IntentCues::detect(prompt);
        self.rules
            .iter()
            .find(|rule| (rule.applies)(&cues))
            .map(|rule| IntentMatch {
                intent: rule.name,
                query: GeneratedQuery::scoped_to(rule.sql, identity),
            })
    }

    pub fn default_query(identity: &Identity) -> GeneratedQuery {
        GeneratedQuery::scoped_to(DEFAULT_ORDERS_SQL, identity)
    }
}

impl Default for IntentMatcher {
    fn default() -> Self {
        Self::new()
    }
}
