use crate::detection::FillValue;

/// Checked-state coercion: only `"true"`, `true` and `"Yes"` check a box.
pub fn truthy(value: &FillValue) -> bool {
    match value {
        FillValue::Bool(b) => *b,
        FillValue::Text(s) => s == "true" || s == "Yes",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exact_truthy_forms_check() {
        for v in [FillValue::Bool(true), "true".into(), "Yes".into()] {
            assert!(truthy(&v), "{v:?}");
        }
        for v in [
            FillValue::Bool(false),
            "false".into(),
            "yes".into(),
            "TRUE".into(),
            "1".into(),
            "on".into(),
            "".into(),
        ] {
            assert!(!truthy(&v), "{v:?}");
        }
    }
}
