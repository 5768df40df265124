//! Model validation.
//!
//! Models declare a [`RuleSet`]; an [`Orm`](crate::Orm) configured with a
//! [`ValidationEngine`] checks it before every save and stores the
//! [`ValidationResult`] on the model. [`DefaultValidator`] covers the common
//! rules; applications can plug in their own engine.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use keel_core::{Row, Value};
use regex::Regex;

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

/// A single constraint on an attribute.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Not null and not blank.
    Required,
    /// At least this many characters.
    MinLength(usize),
    /// At most this many characters.
    MaxLength(usize),
    /// A plausible email address.
    Email,
    /// Matches a regular expression.
    Pattern {
        /// Compiled pattern.
        regex: Regex,
        /// Message reported on mismatch.
        message: String,
    },
    /// Numeric value within bounds.
    Range {
        /// Inclusive lower bound.
        min: Option<f64>,
        /// Inclusive upper bound.
        max: Option<f64>,
    },
}

impl Rule {
    /// Builds a [`Rule::Pattern`].
    ///
    /// # Errors
    ///
    /// Returns the regex error if `pattern` does not compile.
    pub fn pattern(pattern: &str, message: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self::Pattern {
            regex: Regex::new(pattern)?,
            message: message.into(),
        })
    }

    /// Checks `value`, returning a message if it fails.
    ///
    /// Only [`Rule::Required`] rejects a missing or null value.
    #[must_use]
    pub fn check(&self, value: Option<&Value>) -> Option<String> {
        let value = match value {
            None | Some(Value::Null) => {
                return matches!(self, Self::Required).then(|| String::from("This field is required."));
            }
            Some(value) => value,
        };

        match self {
            Self::Required => value
                .as_str()
                .is_some_and(|s| s.trim().is_empty())
                .then(|| String::from("This field is required.")),
            Self::MinLength(min) => value
                .as_str()
                .filter(|s| s.chars().count() < *min)
                .map(|_| format!("Ensure this value has at least {min} characters.")),
            Self::MaxLength(max) => value
                .as_str()
                .filter(|s| s.chars().count() > *max)
                .map(|_| format!("Ensure this value has at most {max} characters.")),
            Self::Email => {
                let valid = value
                    .as_str()
                    .is_some_and(|s| EMAIL.as_ref().is_some_and(|re| re.is_match(s)));
                (!valid).then(|| String::from("Enter a valid email address."))
            }
            Self::Pattern { regex, message } => {
                let valid = value.as_str().is_some_and(|s| regex.is_match(s));
                (!valid).then(|| message.clone())
            }
            Self::Range { min, max } => {
                let Some(number) = value.as_f64() else {
                    return Some(String::from("Enter a valid number."));
                };
                let too_small = min.is_some_and(|min| number < min);
                let too_large = max.is_some_and(|max| number > max);
                (too_small || too_large).then(|| match (min, max) {
                    (Some(min), Some(max)) => format!("Value must be between {min} and {max}."),
                    (Some(min), None) => format!("Value must be at least {min}."),
                    (None, Some(max)) => format!("Value must be at most {max}."),
                    (None, None) => String::from("Invalid value."),
                })
            }
        }
    }
}

/// Rules per attribute, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: IndexMap<String, Vec<Rule>>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for `field`.
    #[must_use]
    pub fn rule(mut self, field: impl Into<String>, rule: Rule) -> Self {
        self.push(field, rule);
        self
    }

    /// Adds a rule for `field` in place.
    pub fn push(&mut self, field: impl Into<String>, rule: Rule) {
        self.rules.entry(field.into()).or_default().push(rule);
    }

    /// Returns whether no rules are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over fields and their rules.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Rule])> {
        self.rules.iter().map(|(field, rules)| (field.as_str(), rules.as_slice()))
    }
}

/// Messages collected by a validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: IndexMap<String, Vec<String>>,
}

impl ValidationResult {
    /// Creates a passing result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    /// Returns whether no messages were recorded.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns whether any message was recorded.
    #[must_use]
    pub fn invalid(&self) -> bool {
        !self.valid()
    }

    /// Returns the messages per field.
    #[must_use]
    pub const fn errors(&self) -> &IndexMap<String, Vec<String>> {
        &self.errors
    }

    /// Returns the messages for one field.
    #[must_use]
    pub fn errors_for(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Checks attributes against rules.
pub trait ValidationEngine: Send + Sync {
    /// Validates the attributes of one `model` instance.
    fn validate(&self, model: &str, attributes: &Row, rules: &RuleSet) -> ValidationResult;
}

/// Applies every [`Rule`] to its attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl ValidationEngine for DefaultValidator {
    fn validate(&self, _model: &str, attributes: &Row, rules: &RuleSet) -> ValidationResult {
        let mut result = ValidationResult::new();
        for (field, field_rules) in rules.iter() {
            for rule in field_rules {
                if let Some(message) = rule.check(attributes.get(field)) {
                    result.add(field, message);
                }
            }
        }
        result
    }
}
