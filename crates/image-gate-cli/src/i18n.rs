// crates/image-gate-cli/src/i18n.rs
// ============================================================================
// Module: CLI Internationalization Helpers
// Description: Provides message catalog and translation utilities for the CLI.
// Purpose: Centralize user-facing strings for future localization support.
// Dependencies: Standard library collections and formatting utilities.
// ============================================================================

//! ## Overview
//! The Image Gate CLI stores user-facing strings in a small translation
//! catalog to enforce consistent messaging across locales, including the
//! column headings of the verdict table. All runtime output should be routed
//! through the [`t!`](crate::t) macro.
//!
//! ## Invariants
//! - The catalog is initialized once and read-only thereafter.
//! - Missing keys fall back to English and then to the key itself.
//! - Placeholder substitutions preserve deterministic order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Supported CLI locales.
///
/// # Invariants
/// - Variants are stable for CLI parsing and catalog lookup.
/// - [`Locale::En`] is the default fallback locale.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Locale {
    /// English (default).
    En,
    /// Catalan.
    Ca,
}

impl Locale {
    /// Returns the canonical locale label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ca => "ca",
        }
    }

    /// Attempts to parse a locale value (case-insensitive, tolerant of region tags).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let normalized = value.to_ascii_lowercase();
        let lang = normalized.split(['-', '_']).next().unwrap_or("");
        match lang {
            "en" => Some(Self::En),
            "ca" => Some(Self::Ca),
            _ => None,
        }
    }
}

/// Ordered list of supported CLI locales.
///
/// # Invariants
/// - Ordering is stable for deterministic presentation.
pub const SUPPORTED_LOCALES: &[Locale] = &[Locale::En, Locale::Ca];

/// A formatted message argument captured by the [`macro@crate::t`] macro.
///
/// # Invariants
/// - `key` matches a placeholder name without braces (for example, `path`).
/// - `value` is preformatted and should be safe for display.
#[derive(Clone)]
pub struct MessageArg {
    /// The placeholder name used in message templates (e.g., `"path"`).
    pub key: &'static str,
    /// The formatted string value to substitute for this placeholder.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`] from a key and displayable value.
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Locale Selection
// ============================================================================

/// Global locale selection for CLI output.
static CURRENT_LOCALE: OnceLock<Locale> = OnceLock::new();

/// Sets the CLI locale. Only the first call wins.
pub fn set_locale(locale: Locale) {
    let _ = CURRENT_LOCALE.set(locale);
}

/// Returns the current CLI locale (defaults to English).
#[must_use]
pub fn current_locale() -> Locale {
    CURRENT_LOCALE.get().copied().unwrap_or(Locale::En)
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Static English catalog entries loaded into the localized message bundle.
const CATALOG_EN: &[(&str, &str)] = &[
    ("main.version", "image-gate {version}"),
    ("output.stream.stdout", "stdout"),
    ("output.stream.stderr", "stderr"),
    ("output.stream.unknown", "output"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("output.json.serialize_failed", "Failed to serialize JSON output: {error}"),
    ("config.load_failed", "Failed to load configuration: {error}"),
    ("config.validate.ok", "Config valid."),
    ("config.log.path_missing", "log.sink = \"file\" requires log.path"),
    ("config.log.open_failed", "Failed to open evaluation log at {path}: {error}"),
    ("bundle.load_failed", "Failed to load bundle {path}: {error}"),
    (
        "bundle.validate.ok",
        "Bundle {id} valid: {policies} policies, {whitelists} whitelists, {mappings} mappings.",
    ),
    ("bundle.hash.failed", "Failed to hash bundle: {error}"),
    ("bundle.hash.ok", "{algorithm}:{value}"),
    ("gate.policy_required", "Either --policy or --run-bundle with --bundlefile is required."),
    ("gate.policy.load_failed", "Failed to load policy {path}: {error}"),
    ("gate.whitelist.load_failed", "Failed to load global whitelist {path}: {error}"),
    ("gate.metadata.failed", "Failed to read metadata for image {image}: {error}"),
    ("gate.evaluation_failed", "Evaluation of image {image} failed: {error}"),
    ("gate.tag_failed", "Evaluation of tag {tag} failed: {error}"),
    ("gate.warning.malformed", "Warning: gate {gate} output line {line} skipped: {reason}"),
    ("gate.warning.ledger", "Warning: image ledger unavailable, treated as empty: {error}"),
    ("gate.table.image_id", "Image Id"),
    ("gate.table.repo_tag", "Repo Tag"),
    ("gate.table.gate", "Gate"),
    ("gate.table.trigger", "Trigger"),
    ("gate.table.check_output", "Check Output"),
    ("gate.table.gate_action", "Gate Action"),
    ("gate.table.trigger_id", "Trigger Id"),
    ("gate.table.whitelisted", "Whitelisted"),
    ("gate.table.no_tag", "none"),
    ("gate.whitelisted.none", "none"),
    ("gate.whitelisted.ledger", "image ledger"),
    ("gate.whitelisted.global_label", "global"),
    ("gate.whitelisted.global", "{whitelist}: {pattern}"),
    ("gate.whitelisted.advisory_prefix", "{whitelist}: {pattern} (advisory prefix)"),
    ("i18n.lang.invalid_env", "Invalid {env} value: {value}. Expected 'en' or 'ca'."),
    (
        "i18n.disclaimer.machine_translated",
        "Note: non-English output is machine-translated and may be inaccurate.",
    ),
];

/// Static Catalan catalog entries loaded into the localized message bundle.
const CATALOG_CA: &[(&str, &str)] = &[
    ("main.version", "image-gate {version}"),
    ("output.stream.stdout", "stdout"),
    ("output.stream.stderr", "stderr"),
    ("output.stream.unknown", "sortida"),
    ("output.write_failed", "No s'ha pogut escriure a {stream}: {error}"),
    ("output.json.serialize_failed", "No s'ha pogut serialitzar la sortida JSON: {error}"),
    ("config.load_failed", "No s'ha pogut carregar la configuració: {error}"),
    ("config.validate.ok", "Configuració vàlida."),
    ("config.log.path_missing", "log.sink = \"file\" requereix log.path"),
    (
        "config.log.open_failed",
        "No s'ha pogut obrir el registre d'avaluació a {path}: {error}",
    ),
    ("bundle.load_failed", "No s'ha pogut carregar el paquet {path}: {error}"),
    (
        "bundle.validate.ok",
        "Paquet {id} vàlid: {policies} polítiques, {whitelists} llistes blanques, {mappings} \
         assignacions.",
    ),
    ("bundle.hash.failed", "No s'ha pogut calcular el hash del paquet: {error}"),
    ("bundle.hash.ok", "{algorithm}:{value}"),
    (
        "gate.policy_required",
        "Cal indicar --policy o bé --run-bundle amb --bundlefile.",
    ),
    ("gate.policy.load_failed", "No s'ha pogut carregar la política {path}: {error}"),
    (
        "gate.whitelist.load_failed",
        "No s'ha pogut carregar la llista blanca global {path}: {error}",
    ),
    (
        "gate.metadata.failed",
        "No s'han pogut llegir les metadades de la imatge {image}: {error}",
    ),
    ("gate.evaluation_failed", "Ha fallat l'avaluació de la imatge {image}: {error}"),
    ("gate.tag_failed", "Ha fallat l'avaluació de l'etiqueta {tag}: {error}"),
    (
        "gate.warning.malformed",
        "Avís: s'ha omès la línia {line} de la sortida de la porta {gate}: {reason}",
    ),
    (
        "gate.warning.ledger",
        "Avís: el registre de la imatge no està disponible i es tracta com a buit: {error}",
    ),
    ("gate.table.image_id", "Id d'imatge"),
    ("gate.table.repo_tag", "Etiqueta"),
    ("gate.table.gate", "Porta"),
    ("gate.table.trigger", "Disparador"),
    ("gate.table.check_output", "Resultat de la comprovació"),
    ("gate.table.gate_action", "Acció de la porta"),
    ("gate.table.trigger_id", "Id del disparador"),
    ("gate.table.whitelisted", "A la llista blanca"),
    ("gate.table.no_tag", "cap"),
    ("gate.whitelisted.none", "cap"),
    ("gate.whitelisted.ledger", "registre de la imatge"),
    ("gate.whitelisted.global_label", "global"),
    ("gate.whitelisted.global", "{whitelist}: {pattern}"),
    ("gate.whitelisted.advisory_prefix", "{whitelist}: {pattern} (prefix d'avís)"),
    ("i18n.lang.invalid_env", "Valor no vàlid per a {env}: {value}. S'esperava 'en' o 'ca'."),
    (
        "i18n.disclaimer.machine_translated",
        "Nota: la sortida que no és en anglès està traduïda automàticament i pot ser inexacta.",
    ),
];

/// Returns the raw catalog entries for the requested locale, in declaration order.
pub(crate) const fn catalog_entries_for(locale: Locale) -> &'static [(&'static str, &'static str)] {
    match locale {
        Locale::En => CATALOG_EN,
        Locale::Ca => CATALOG_CA,
    }
}

/// Returns the message catalog for the requested locale.
pub(crate) fn catalog_for(locale: Locale) -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_EN_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    static CATALOG_CA_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    match locale {
        Locale::En => {
            CATALOG_EN_MAP.get_or_init(|| catalog_entries_for(Locale::En).iter().copied().collect())
        }
        Locale::Ca => {
            CATALOG_CA_MAP.get_or_init(|| catalog_entries_for(Locale::Ca).iter().copied().collect())
        }
    }
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Translates `key` using the selected locale while substituting `args`.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let locale = current_locale();
    let template = catalog_for(locale)
        .get(key)
        .copied()
        .or_else(|| catalog_for(Locale::En).get(key).copied())
        .unwrap_or(key);
    if args.is_empty() {
        return template.to_string();
    }

    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a localized message from a key and named arguments.
///
/// # Arguments
///
/// - `$key` must match a catalog entry.
/// - Named arguments are substituted into `{placeholder}` positions.
///
/// # Returns
///
/// A localized [`String`] with placeholders substituted.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}
