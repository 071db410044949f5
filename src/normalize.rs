use std::sync::LazyLock;

use regex::Regex;

static SLASH_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}/\d{1,2}$").expect("static pattern"));

/// `8,5` and `8/5` read as 8.5, `1.2.3` as 1.23. Unparseable or empty cells are 0.0.
pub fn normalize_score(value: Option<&str>) -> f64 {
    let Some(raw) = value else {
        return 0.0;
    };

    let mut value = raw.trim().replace(',', ".");
    if SLASH_DECIMAL.is_match(&value) {
        value = value.replacen('/', ".", 1);
    }

    let value: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let value = match value.split_once('.') {
        Some((whole, rest)) if rest.contains('.') => {
            format!("{whole}.{}", rest.replace('.', ""))
        }
        _ => value,
    };

    if value.is_empty() {
        return 0.0;
    }
    value.parse::<f64>().unwrap_or(0.0)
}

pub fn normalize_label(value: &str) -> String {
    value.trim().to_uppercase()
}

pub fn same_name(left: &str, right: &str) -> bool {
    normalize_label(left) == normalize_label(right)
}
