//! Finding type -> CWE classification
//!
//! Best effort: types not in the table map to [`GENERIC_CWE`].

/// Placeholder for unclassified findings
pub const GENERIC_CWE: &str = "CWE-1000";

const TABLE: &[(&str, &str)] = &[
    ("insecure-transport", "CWE-319"),
    ("missing-hsts", "CWE-319"),
    ("weak-tls", "CWE-326"),
    ("missing-security-header", "CWE-693"),
    ("cors-misconfiguration", "CWE-942"),
    ("information-disclosure", "CWE-200"),
    ("sensitive-data-exposure", "CWE-200"),
    ("verbose-error", "CWE-209"),
    ("credentials-in-url", "CWE-598"),
    ("sql-injection", "CWE-89"),
    ("xss", "CWE-79"),
    ("missing-authentication", "CWE-306"),
    ("cookie-without-secure-flag", "CWE-614"),
    ("open-redirect", "CWE-601"),
    ("missing-rate-limiting", "CWE-770"),
];

/// CWE identifier for a finding type
pub fn lookup(finding_type: &str) -> &'static str {
    TABLE
        .iter()
        .find(|(t, _)| *t == finding_type)
        .map(|(_, cwe)| *cwe)
        .unwrap_or(GENERIC_CWE)
}
