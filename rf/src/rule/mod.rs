//! Mapping rules: model, validation, catalogs and storage

mod catalog;
mod letters;
mod model;
mod store;

pub use catalog::{ADVANCES_COLUMNS, BANK_COLUMNS, SALES_COLUMNS, default_advances_rule, default_columns, default_sales_rule};
pub use letters::{column_letter, lettered_columns, parse_column_lines};
pub use model::{
    AdvancesExtras, BankExtras, Domain, Lookup, MappingRule, MarkerStrip, RuleKey, RuleKind, SalesExtras,
    ValidationError, validate, validate_bank_set, validate_columns,
};
pub use store::{Catalogs, MemoryRuleStore, RuleStore, RulesDocument, StoreError, YamlRuleStore};
