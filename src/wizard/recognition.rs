//! Rule-based field extraction over recognized text.
//!
//! The recognition engine itself lives outside the crate behind
//! [`Recognizer`]; this module only turns its text into form fields.

use std::{collections::BTreeMap, future::Future, sync::OnceLock};

use regex::Regex;

use super::state::{FieldKey, SelectedFile};

/// External text recognition (OCR or similar).
pub trait Recognizer: Send + Sync {
    fn recognize(
        &self,
        file: &SelectedFile,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

// One rule per field, applied in this order. Labels are matched in Traditional
// Chinese or English, case-insensitively, and only at the start of a line, so
// `出生日期` never reads as a date label nor `Doctor name` as a name. Each value
// runs to the end of its line.
const RULES: [(FieldKey, &str); 7] = [
    (
        FieldKey::Name,
        r"(?im)^[ \t]*(?:病人姓名|姓名|patient name|name)[ \t]*[:：][ \t]*([^\r\n]+)",
    ),
    (
        FieldKey::IdNumber,
        r"(?im)^[ \t]*(?:身份證號碼|身份證|hkid|id no\.?|id)[ \t]*[:：][ \t]*([A-Z]{1,2}\d{6}[ \t]*\(?[0-9A]\)?)",
    ),
    (
        FieldKey::Phone,
        r"(?im)^[ \t]*(?:聯絡電話|電話|手提|phone|tel|mobile)[ \t]*[:：]?[ \t]*((?:\+852[ \t-]?)?\d{4}[ \t-]?\d{4})",
    ),
    (
        FieldKey::Date,
        r"(?im)^[ \t]*(?:預約日期|覆診日期|日期|date)[ \t]*[:：][ \t]*(\d{4}[ \t]*[-/.年][ \t]*\d{1,2}[ \t]*[-/.月][ \t]*\d{1,2}[ \t]*日?)",
    ),
    (
        FieldKey::Doctor,
        r"(?im)^[ \t]*(?:主診醫生|醫生|doctor'?s? name|doctor|dr\.?)[ \t]*[:：][ \t]*([^\r\n]+)",
    ),
    (
        FieldKey::Diagnosis,
        r"(?im)^[ \t]*(?:診斷|病症|diagnosis)[ \t]*[:：][ \t]*([^\r\n]+)",
    ),
    (
        FieldKey::Facility,
        r"(?im)^[ \t]*(?:醫療機構|醫院|診所|hospital|clinic|facility)[ \t]*[:：][ \t]*([^\r\n]+)",
    ),
];

fn rules() -> &'static [(FieldKey, Regex)] {
    static COMPILED: OnceLock<Vec<(FieldKey, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|(key, pattern)| {
                (
                    *key,
                    Regex::new(pattern).expect("extraction patterns are valid"),
                )
            })
            .collect()
    })
}

/// Runs every rule against `text`. The first match of a rule is its value;
/// blank values are dropped. An empty map means nothing was recognized.
pub fn extract_fields(text: &str) -> BTreeMap<FieldKey, String> {
    let mut fields = BTreeMap::new();
    for (key, regex) in rules() {
        let Some(captures) = regex.captures(text) else {
            continue;
        };
        let Some(value) = captures.get(1).map(|m| m.as_str().trim()) else {
            continue;
        };
        if !value.is_empty() {
            fields.entry(*key).or_insert_with(|| value.to_string());
        }
    }
    fields
}
