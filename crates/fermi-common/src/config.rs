//! Engine configuration (§6.1). Immutable once the engine is constructed,
//! mirroring the teacher's `locale.rs` pattern of bundling every
//! locale-sensitive token into one struct compiled once at startup.

/// Translated display strings for error codes and function names. The
/// default package is a pass-through identity translation; real language
/// packs are an out-of-scope external collaborator (§1) that can implement
/// this trait.
pub trait TranslationPackage: std::fmt::Debug + Send + Sync {
    fn translate_error(&self, code: &str) -> String {
        code.to_string()
    }

    fn translate_function_name(&self, canonical: &str) -> String {
        canonical.to_string()
    }

    fn canonical_function_name(&self, translated: &str) -> String {
        translated.to_ascii_uppercase()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTranslation;
impl TranslationPackage for IdentityTranslation {}

#[derive(Clone)]
pub struct EngineConfig {
    /// Length of every sample vector (§3.2, §6.1). Default 10,000.
    pub sample_size: usize,
    /// Epsilon used by the near-zero-safe arithmetic helpers in §4.2.
    pub precision_epsilon: f64,
    /// Significant digits kept when `smart_rounding` is enabled.
    pub precision_rounding: u8,
    pub smart_rounding: bool,
    pub currency_symbols: Vec<String>,
    pub decimal_separator: char,
    pub thousand_separator: char,
    pub function_arg_separator: char,
    pub case_sensitive: bool,
    pub accent_sensitive: bool,
    pub match_whole_cell: bool,
    pub use_wildcards: bool,
    pub use_regular_expressions: bool,
    /// Seed for the engine's RNG (§6.1 supplement, required for §8.1's
    /// "Determinism modulo RNG" testable property). `None` seeds from
    /// entropy, matching normal interactive use.
    pub seed: Option<u64>,
    pub translation_package: std::sync::Arc<dyn TranslationPackage>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("sample_size", &self.sample_size)
            .field("precision_epsilon", &self.precision_epsilon)
            .field("precision_rounding", &self.precision_rounding)
            .field("smart_rounding", &self.smart_rounding)
            .field("currency_symbols", &self.currency_symbols)
            .field("decimal_separator", &self.decimal_separator)
            .field("thousand_separator", &self.thousand_separator)
            .field("function_arg_separator", &self.function_arg_separator)
            .field("case_sensitive", &self.case_sensitive)
            .field("accent_sensitive", &self.accent_sensitive)
            .field("match_whole_cell", &self.match_whole_cell)
            .field("use_wildcards", &self.use_wildcards)
            .field("use_regular_expressions", &self.use_regular_expressions)
            .field("seed", &self.seed)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_size: 10_000,
            precision_epsilon: 1e-13,
            precision_rounding: 10,
            smart_rounding: true,
            currency_symbols: vec!["$".to_string()],
            decimal_separator: '.',
            thousand_separator: ',',
            function_arg_separator: ',',
            case_sensitive: false,
            accent_sensitive: false,
            match_whole_cell: true,
            use_wildcards: true,
            use_regular_expressions: false,
            seed: None,
            translation_package: std::sync::Arc::new(IdentityTranslation),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_size(mut self, n: usize) -> Self {
        self.sample_size = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_precision_epsilon(mut self, eps: f64) -> Self {
        self.precision_epsilon = eps;
        self
    }

    pub fn with_smart_rounding(mut self, enabled: bool) -> Self {
        self.smart_rounding = enabled;
        self
    }

    pub fn with_separators(mut self, decimal: char, thousand: char, arg: char) -> Self {
        self.decimal_separator = decimal;
        self.thousand_separator = thousand;
        self.function_arg_separator = arg;
        self
    }

    pub fn with_translation_package(mut self, pkg: std::sync::Arc<dyn TranslationPackage>) -> Self {
        self.translation_package = pkg;
        self
    }
}
