//! Canonical output column catalogs and seeded default rules

use super::model::{AdvancesExtras, Domain, MappingRule, MarkerStrip, RuleKind, SalesExtras};

pub const SALES_COLUMNS: &[&str] = &[
    "AlternateStoreCode",
    "RegionName",
    "StoreName",
    "StoreCode",
    "BillDate",
    "Quantity",
    "Discount",
    "DiscountPercentage",
    "BaseValue",
    "SGST",
    "CGST",
    "IGST",
    "UTGST",
    "Tax",
    "Cash",
    "Card",
    "CreditCardType",
    "Coupon",
    "Credit",
    "InsuranceCredit",
    "CashAdvance",
    "CreditCardAdvance",
    "AdvancedAmount",
    "GiftVoucher",
    "CCNUsed",
    "CCNIssued",
    "PointsAllocated",
    "PointsRedeemed",
    "Cheque",
    "PrepaidCard",
    "OtherPayments",
    "Amount",
    "MRPTOTAL",
    "PinCode",
    "WSDN",
    "Accentiv",
    "AM",
    "CA",
    "Cards",
    "MA",
    "MO",
    "Online Payment",
    "Paytm",
    "PayTM DQR",
    "PayU Payment",
    "PP",
    "QC Wallet",
    "VC",
    "Vouchagram",
    "UPI",
    "Credit Card - Airport Stores",
    "UPI - Airport Stores",
    "Cash - Airport Stores",
];

pub const ADVANCES_COLUMNS: &[&str] = &[
    "Region",
    "Store",
    "Store Code",
    "Order Date",
    "Order Number",
    "Last Bill Date",
    "Bill Number",
    "Customer Code",
    "Customer Name",
    "No Of Items",
    "Total Quantity",
    "Approximate Value",
    "Advance Amount",
    "Cash",
    "Credit Card",
    "Coupon",
    "Credit",
    "GV",
    "CCN",
    "Points",
    "Cheque",
    "Prepaid Card",
    "Temp Credit",
    "Cash Advance",
    "Credit Card Advance",
    "OtherPayments",
    "Payment Mode",
    "Balance Amount",
    "Status",
];

/// Bank columns; the leading space in " SAP Code" is part of the report layout
pub const BANK_COLUMNS: &[&str] = &[
    "Bank Name",
    "Mode",
    "Transaction Date",
    "Bank Credit Date",
    " SAP Code",
    "Amount",
    "Transaction Amount",
    "Bank Charges",
    "GST",
    "MID",
];

/// Catalog for a domain as owned strings
pub fn default_columns(domain: Domain) -> Vec<String> {
    let names = match domain {
        Domain::Sales => SALES_COLUMNS,
        Domain::Advances => ADVANCES_COLUMNS,
        Domain::Bank => BANK_COLUMNS,
    };
    names.iter().map(|s| s.to_string()).collect()
}

/// Sales rule a fresh store starts with
pub fn default_sales_rule() -> MappingRule {
    let mut rule = MappingRule::sales(Vec::new())
        .with_sheet("SalesReportAbstract")
        .with_start_row(6)
        .with_mapping("AlternateStoreCode", "AlternateStoreCode")
        .with_mapping("StoreName", "StoreName")
        .with_mapping("StoreCode", "StoreCode");
    rule.kind = RuleKind::Sales(SalesExtras {
        copy_col_source: Some("AlternateStoreCode".to_string()),
        copy_col_dest: Some("StoreCode".to_string()),
        bp_remove_cols: Vec::new(),
        prefix_remove_col: Some("StoreCode".to_string()),
        prefix_remove_values: vec!["97".to_string(), "98".to_string()],
        marker_strip: Some(MarkerStrip {
            marker: "BP".to_string(),
            columns: vec!["StoreCode".to_string(), "AlternateStoreCode".to_string()],
        }),
    });
    rule
}

/// Advances rule a fresh store starts with
pub fn default_advances_rule() -> MappingRule {
    let mut rule = MappingRule::advances(Vec::new())
        .with_sheet("Sheet")
        .with_start_row(2)
        .with_mapping("Store", "Store");
    rule.kind = RuleKind::Advances(AdvancesExtras {
        vlookup_source_col: Some("Store".to_string()),
        vlookup_sales_col: Some("StoreName".to_string()),
        vlookup_dest_col: Some("Store Code".to_string()),
        vlookup_value_col: Some("StoreCode".to_string()),
    });
    rule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::model::validate;

    #[test]
    fn test_default_rules_validate_against_catalogs() {
        let mut sales = default_sales_rule();
        sales.output_columns = default_columns(Domain::Sales);
        assert!(validate(&sales).is_empty());

        let mut advances = default_advances_rule();
        advances.output_columns = default_columns(Domain::Advances);
        assert!(validate(&advances).is_empty());
    }

    #[test]
    fn test_default_sales_rule_strips_bp_from_store_codes() {
        let rule = default_sales_rule();
        let RuleKind::Sales(extras) = &rule.kind else {
            panic!("sales rule expected");
        };
        let strip = extras.marker_strip.as_ref().unwrap();
        assert_eq!(strip.marker, "BP");
        assert_eq!(strip.columns, vec!["StoreCode", "AlternateStoreCode"]);
    }

    #[test]
    fn test_catalog_sizes() {
        assert_eq!(SALES_COLUMNS.len(), 53);
        assert_eq!(ADVANCES_COLUMNS.len(), 29);
        assert_eq!(BANK_COLUMNS.len(), 10);
        assert_eq!(default_columns(Domain::Bank)[4], " SAP Code");
    }
}
