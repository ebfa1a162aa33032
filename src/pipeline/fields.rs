//! Field pattern ladders.
//!
//! Each field is recovered by trying an ordered list of patterns against the
//! page text; the first pattern that matches wins and its first capture group
//! (trimmed) becomes the value. Patterns are matched case-insensitively with
//! `^`/`$` anchoring per line.
//!
//! Free-text values never cross a line break. A field's primary label with
//! nothing after it still matches, yielding an empty value, so a blank line
//! is not mistaken for the next line or picked up by a looser fallback.
//!
//! The ladders are plain data ([`FIELD_PATTERNS`]) so each one can be tested
//! on its own and extended without touching the extractor.

use crate::model::Field;
use once_cell::sync::Lazy;
use regex::Regex;

/// Ordered patterns for one field plus the value used when none match.
#[derive(Debug, Clone, Copy)]
pub struct FieldPatterns {
    pub field: Field,
    pub patterns: &'static [&'static str],
    pub default: &'static str,
}

/// Every field ladder, in extraction order.
pub const FIELD_PATTERNS: &[FieldPatterns] = &[
    FieldPatterns {
        field: Field::BillSrNo,
        patterns: &[r"Bill\s*Sr\s*No[:\s]*(\d+)", r"BillSrNo[:\s]*(\d+)"],
        default: "",
    },
    FieldPatterns {
        field: Field::PropertyId,
        patterns: &[r"Property\s*Id[:\s]*([A-Z0-9]+)", r"PropertyId[:\s]*([A-Z0-9]+)"],
        default: "",
    },
    FieldPatterns {
        field: Field::OldPropertyId,
        patterns: &[
            r"Old\s*Property\s*Id[:\s]*([A-Z0-9/-]+)",
            r"OldPropertyId[:\s]*([A-Z0-9/-]+)",
        ],
        default: "",
    },
    FieldPatterns {
        field: Field::FinancialYear,
        patterns: &[
            r"Financial\s*Year[:\s]*(\d{4}-\d{2,4})",
            r"FY[:\s]*(\d{4}-\d{2,4})",
        ],
        default: "2025-26",
    },
    FieldPatterns {
        field: Field::PrintDate,
        patterns: &[r"Print\s*Date[:\s]*([0-9/\-]+)", r"Date[:\s]*([0-9/\-]+)"],
        default: "",
    },
    FieldPatterns {
        field: Field::Mobile,
        patterns: &[
            r"Mobile\s*No[:\s]*(\d{10})",
            r"Mobile[:\s]*(\d{10})",
            r"Phone[:\s]*(\d{10})",
        ],
        default: "",
    },
    FieldPatterns {
        field: Field::Colony,
        patterns: &[r"Colony\s*Name[:\t ]*([^\n]*)", r"Colony[:\t ]*([^\n]+)"],
        default: "",
    },
    FieldPatterns {
        field: Field::OwnerName,
        patterns: &[r"Owner\s*Name[:\t ]*([^\n]*)", r"Owner[:\t ]*([^\n]+)"],
        default: "",
    },
    FieldPatterns {
        field: Field::PlotAddress,
        patterns: &[r"Plot\s*Address[:\t ]*([^\n]*)", r"Address[:\t ]*([^\n]+)"],
        default: "",
    },
    FieldPatterns {
        field: Field::PermanentAddress,
        patterns: &[r"Permanent\s*Address[:\t ]*([^\n]*)"],
        default: "",
    },
    FieldPatterns {
        field: Field::TotalArea,
        patterns: &[r"Total\s*Area[:\s]*([0-9.]+\s*SqYard)", r"Area[:\s]*([0-9.]+)"],
        default: "",
    },
    FieldPatterns {
        field: Field::Category,
        patterns: &[r"Category[:\t ]*([^\n,]*)", r"Type[:\t ]*([^\n,]+)"],
        default: "",
    },
    FieldPatterns {
        field: Field::AuthorizedStatus,
        patterns: &[r"Authorized\s*Status[:\t ]*([^\n]*)"],
        default: "",
    },
    FieldPatterns {
        field: Field::TotalOutstanding,
        patterns: &[
            r"Total\s*Outstanding[:\s]*Rs?\.?\s*([0-9,.-]+)",
            r"Outstanding[:\s]*Rs?\.?\s*([0-9,.-]+)",
        ],
        default: "",
    },
    FieldPatterns {
        field: Field::PropertyTaxOutstanding,
        patterns: &[r"Property\s*&?\s*Fire\s*Tax\s*Outstanding[:\s]*Rs?\.?\s*([0-9,.-]+)"],
        default: "",
    },
];

/// Label-plus-number patterns tried on raw text when no positioned serial
/// was found.
pub const SERIAL_FALLBACK_PATTERNS: &[&str] = &[
    r"Bill\s*Sr\.?\s*No\.?[:\s#-]*(\d+)",
    r"BillSrNo[:\s]*(\d+)",
    r"Serial\s*No\.?[:\s#-]*(\d+)",
];

/// Coordinate pair written as `<lat> : <lon>`.
pub static COORDINATES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-?\d+\.\d+)\s*:\s*(-?\d+\.\d+)").unwrap());

/// A span that carries the serial label.
pub static SERIAL_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bBill\s*Sr\.?\s*No\b\.?").unwrap());

/// A serial label followed by its number inside the same span.
pub static SERIAL_LABEL_WITH_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bBill\s*Sr\.?\s*No\b\.?\s*[:#-]?\s*(\d+)\s*$").unwrap()
});

/// A standalone all-digit token.
pub static DIGITS_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

/// A compiled ladder.
#[derive(Debug)]
pub struct Ladder {
    pub field: Option<Field>,
    patterns: Vec<Regex>,
    default: &'static str,
}

impl Ladder {
    fn compile(field: Option<Field>, patterns: &[&str], default: &'static str) -> Self {
        Self {
            field,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(&format!("(?im){p}")).unwrap())
                .collect(),
            default,
        }
    }

    /// First trimmed capture across the ladder, if any pattern matches.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
    }

    /// Like [`Ladder::find`] but falls back to the ladder's default.
    pub fn value(&self, text: &str) -> String {
        self.find(text).unwrap_or(self.default).to_string()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

static LADDERS: Lazy<Vec<Ladder>> = Lazy::new(|| {
    FIELD_PATTERNS
        .iter()
        .map(|fp| Ladder::compile(Some(fp.field), fp.patterns, fp.default))
        .collect()
});

static SERIAL_FALLBACK: Lazy<Ladder> =
    Lazy::new(|| Ladder::compile(None, SERIAL_FALLBACK_PATTERNS, ""));

/// All compiled field ladders, in [`FIELD_PATTERNS`] order.
pub fn ladders() -> &'static [Ladder] {
    &LADDERS
}

/// The compiled ladder for one field.
pub fn ladder(field: Field) -> Option<&'static Ladder> {
    LADDERS.iter().find(|l| l.field == Some(field))
}

/// The raw-text serial fallback ladder.
pub fn serial_fallback() -> &'static Ladder {
    &SERIAL_FALLBACK
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(field: Field, text: &str) -> String {
        ladder(field).unwrap().value(text)
    }

    #[test]
    fn every_field_has_a_ladder() {
        for field in Field::ALL {
            let l = ladder(field).unwrap_or_else(|| panic!("no ladder for {field:?}"));
            assert!(!l.is_empty());
        }
        assert_eq!(ladders().len(), Field::ALL.len());
    }

    #[test]
    fn first_matching_pattern_wins() {
        let text = "Owner: fallback\nOwner Name: Priya Sharma";
        assert_eq!(value(Field::OwnerName, text), "Priya Sharma");
    }

    #[test]
    fn later_pattern_used_when_first_misses() {
        assert_eq!(value(Field::OwnerName, "owner : Ravi Kumar"), "Ravi Kumar");
        assert_eq!(value(Field::Mobile, "Phone: 9876543210"), "9876543210");
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(value(Field::Colony, "COLONY NAME: Akash Nagar"), "Akash Nagar");
    }

    #[test]
    fn financial_year_has_default() {
        assert_eq!(value(Field::FinancialYear, "nothing here"), "2025-26");
        assert_eq!(value(Field::FinancialYear, "FY: 2024-25"), "2024-25");
    }

    #[test]
    fn missing_field_is_empty() {
        assert_eq!(value(Field::AuthorizedStatus, "Owner Name: X"), "");
    }

    #[test]
    fn outstanding_strips_currency() {
        let text = "Total Outstanding: Rs. 12,450.00\nProperty & Fire Tax Outstanding: Rs 900";
        assert_eq!(value(Field::TotalOutstanding, text), "12,450.00");
        assert_eq!(value(Field::PropertyTaxOutstanding, text), "900");
    }

    #[test]
    fn total_area_keeps_unit() {
        assert_eq!(value(Field::TotalArea, "Total Area: 150.5 SqYard"), "150.5 SqYard");
        assert_eq!(value(Field::TotalArea, "Area: 90"), "90");
    }

    #[test]
    fn blank_label_does_not_take_next_line() {
        let text = "Owner Name:\nBillSrNo: 7\nColony Name:   \nPlot Address: 4 Ring Road";
        assert_eq!(value(Field::OwnerName, text), "");
        assert_eq!(value(Field::Colony, text), "");
        assert_eq!(value(Field::PlotAddress, text), "4 Ring Road");
    }

    #[test]
    fn category_stops_at_comma() {
        assert_eq!(value(Field::Category, "Category: Residential, Self"), "Residential");
    }

    #[test]
    fn serial_fallback_variants() {
        let fb = serial_fallback();
        assert_eq!(fb.find("Bill Sr. No. 42"), Some("42"));
        assert_eq!(fb.find("BillSrNo: 7"), Some("7"));
        assert_eq!(fb.find("Serial No: 19"), Some("19"));
        assert_eq!(fb.find("no serial"), None);
    }

    #[test]
    fn serial_label_spans() {
        assert!(SERIAL_LABEL.is_match("Bill Sr No"));
        assert!(SERIAL_LABEL.is_match("BILL SR. NO."));
        let caps = SERIAL_LABEL_WITH_NUMBER.captures("Bill Sr No: 112").unwrap();
        assert_eq!(&caps[1], "112");
        assert!(SERIAL_LABEL_WITH_NUMBER.captures("Bill Sr No:").is_none());
    }
}
