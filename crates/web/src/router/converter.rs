//! Converters turn the `<conv(args):name>` parts of a rule into regular expressions and
//! convert the captured text into an [`ArgValue`].
//!
//! The available converters are looked up by name in a [`Converters`] registry:
//!
//! | name                | matches                              | value          |
//! |---------------------|--------------------------------------|----------------|
//! | `default`, `string` | one path segment                     | string         |
//! | `int`               | digits, optionally signed            | int            |
//! | `float`             | `digits.digits`, optionally signed   | float          |
//! | `path`              | anything, slashes included           | string         |
//! | `any(a, b, ..)`     | one of the given items               | string         |
//! | `uuid`              | a hyphenated uuid                    | string         |
//! | `regex('..')`       | the given regular expression         | string         |
//! | `port`              | an optional `:NNNN` suffix of a host | int or none    |

use crate::error::RouteError;
use crate::router::ArgValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converts one rule variable.
pub trait Converter: Send + Sync + fmt::Debug {
    /// The regular expression the variable matches. Groups must be non-capturing.
    fn regex(&self) -> &str;

    /// Ordering weight among dynamic parts, lower weights are tried first.
    fn weight(&self) -> u32 {
        100
    }

    /// Converts the captured text. `None` rejects the value and the rule does not match.
    fn to_value(&self, raw: &str) -> Option<ArgValue> {
        Some(ArgValue::from(raw))
    }
}

/// A literal passed to a converter inside the parentheses of a rule variable.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgLiteral {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// The arguments of a converter, e.g. `length=2` in `<string(length=2):code>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConverterArgs {
    positional: Vec<ArgLiteral>,
    keyword: Vec<(String, ArgLiteral)>,
}

impl ConverterArgs {
    /// Parses a comma separated argument list.
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut args = ConverterArgs::default();

        for item in split_top_level(source)? {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }

            match keyword_split(item) {
                Some((name, value)) => args.keyword.push((name.to_owned(), parse_literal(value.trim())?)),
                None if args.keyword.is_empty() => args.positional.push(parse_literal(item)?),
                None => return Err(format!("positional argument '{item}' follows keyword arguments")),
            }
        }

        Ok(args)
    }

    pub fn positional(&self) -> &[ArgLiteral] {
        &self.positional
    }

    pub fn keyword(&self, name: &str) -> Option<&ArgLiteral> {
        self.keyword.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    /// Looks an argument up by keyword, falling back to its position.
    pub fn get(&self, index: usize, name: &str) -> Option<&ArgLiteral> {
        self.keyword(name).or_else(|| self.positional.get(index))
    }

    fn int(&self, index: usize, name: &str) -> Result<Option<i64>, String> {
        match self.get(index, name) {
            None | Some(ArgLiteral::None) => Ok(None),
            Some(ArgLiteral::Int(value)) => Ok(Some(*value)),
            Some(other) => Err(format!("'{name}' must be an integer, got {other:?}")),
        }
    }

    fn usize(&self, index: usize, name: &str) -> Result<Option<usize>, String> {
        self.int(index, name)?
            .map(|value| usize::try_from(value).map_err(|e| format!("'{name}' must not be negative: {e}")))
            .transpose()
    }

    #[expect(clippy::cast_precision_loss, reason = "bounds are small literals")]
    fn float(&self, index: usize, name: &str) -> Result<Option<f64>, String> {
        match self.get(index, name) {
            None | Some(ArgLiteral::None) => Ok(None),
            Some(ArgLiteral::Float(value)) => Ok(Some(*value)),
            Some(ArgLiteral::Int(value)) => Ok(Some(*value as f64)),
            Some(other) => Err(format!("'{name}' must be a number, got {other:?}")),
        }
    }

    fn bool(&self, index: usize, name: &str) -> Result<bool, String> {
        match self.get(index, name) {
            None => Ok(false),
            Some(ArgLiteral::Bool(value)) => Ok(*value),
            Some(other) => Err(format!("'{name}' must be a boolean, got {other:?}")),
        }
    }

    fn strings(&self) -> Result<Vec<String>, String> {
        self.positional
            .iter()
            .map(|literal| match literal {
                ArgLiteral::Str(value) => Ok(value.clone()),
                other => Err(format!("expected a string, got {other:?}")),
            })
            .collect()
    }
}

fn split_top_level(source: &str) -> Result<Vec<&str>, String> {
    let mut items = Vec::new();
    let mut quote = None;
    let mut escaped = false;
    let mut depth = 0_usize;
    let mut start = 0;

    for (index, c) in source.char_indices() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&source[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err("unterminated string literal".to_owned());
    }
    items.push(&source[start..]);
    Ok(items)
}

fn keyword_split(item: &str) -> Option<(&str, &str)> {
    let (name, value) = item.split_once('=')?;
    let name = name.trim();
    let is_identifier = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_identifier.then_some((name, value))
}

fn parse_literal(source: &str) -> Result<ArgLiteral, String> {
    let literal = match source {
        "None" => ArgLiteral::None,
        "True" => ArgLiteral::Bool(true),
        "False" => ArgLiteral::Bool(false),
        _ if is_quoted(source) => ArgLiteral::Str(unescape(&source[1..source.len() - 1])),
        _ => {
            if let Ok(value) = source.parse::<i64>() {
                ArgLiteral::Int(value)
            } else if let Ok(value) = source.parse::<f64>() {
                ArgLiteral::Float(value)
            } else if source.is_empty() {
                return Err("empty argument".to_owned());
            } else {
                ArgLiteral::Str(source.to_owned())
            }
        }
    };
    Ok(literal)
}

fn is_quoted(source: &str) -> bool {
    source.len() >= 2
        && ((source.starts_with('\'') && source.ends_with('\'')) || (source.starts_with('"') && source.ends_with('"')))
}

fn unescape(source: &str) -> String {
    let mut result = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next @ ('\\' | '\'' | '"')) => result.push(next),
                Some(next) => {
                    result.push('\\');
                    result.push(next);
                }
                None => result.push('\\'),
            },
            _ => result.push(c),
        }
    }
    result
}

/// The default converter: one path segment, with optional length bounds.
#[derive(Debug)]
pub struct StringConverter {
    regex: String,
}

impl StringConverter {
    pub fn new(minlength: usize, maxlength: Option<usize>, length: Option<usize>) -> Self {
        let regex = match (length, maxlength) {
            (Some(length), _) => format!("[^/]{{{length}}}"),
            (None, Some(maxlength)) => format!("[^/]{{{minlength},{maxlength}}}"),
            (None, None) if minlength == 1 => "[^/]+".to_owned(),
            (None, None) => format!("[^/]{{{minlength},}}"),
        };
        Self { regex }
    }

    fn from_args(args: &ConverterArgs) -> Result<Self, String> {
        Ok(Self::new(args.usize(0, "minlength")?.unwrap_or(1), args.usize(1, "maxlength")?, args.usize(2, "length")?))
    }
}

impl Default for StringConverter {
    fn default() -> Self {
        Self::new(1, None, None)
    }
}

impl Converter for StringConverter {
    fn regex(&self) -> &str {
        &self.regex
    }
}

#[derive(Debug)]
pub struct IntConverter {
    regex: String,
    fixed_digits: Option<usize>,
    min: Option<i64>,
    max: Option<i64>,
}

impl IntConverter {
    fn from_args(args: &ConverterArgs) -> Result<Self, String> {
        let signed = args.bool(3, "signed")?;
        Ok(Self {
            regex: if signed { r"-?\d+".to_owned() } else { r"\d+".to_owned() },
            fixed_digits: args.usize(0, "fixed_digits")?.filter(|digits| *digits > 0),
            min: args.int(1, "min")?,
            max: args.int(2, "max")?,
        })
    }
}

impl Converter for IntConverter {
    fn regex(&self) -> &str {
        &self.regex
    }

    fn weight(&self) -> u32 {
        50
    }

    fn to_value(&self, raw: &str) -> Option<ArgValue> {
        if self.fixed_digits.is_some_and(|digits| raw.trim_start_matches('-').len() != digits) {
            return None;
        }
        let value = raw.parse::<i64>().ok()?;
        let in_bounds = self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max);
        in_bounds.then_some(ArgValue::Int(value))
    }
}

#[derive(Debug)]
pub struct FloatConverter {
    regex: String,
    min: Option<f64>,
    max: Option<f64>,
}

impl FloatConverter {
    fn from_args(args: &ConverterArgs) -> Result<Self, String> {
        let signed = args.bool(2, "signed")?;
        Ok(Self {
            regex: if signed { r"-?\d+\.\d+".to_owned() } else { r"\d+\.\d+".to_owned() },
            min: args.float(0, "min")?,
            max: args.float(1, "max")?,
        })
    }
}

impl Converter for FloatConverter {
    fn regex(&self) -> &str {
        &self.regex
    }

    fn weight(&self) -> u32 {
        50
    }

    fn to_value(&self, raw: &str) -> Option<ArgValue> {
        let value = raw.parse::<f64>().ok()?;
        let in_bounds = self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max);
        in_bounds.then_some(ArgValue::Float(value))
    }
}

/// Matches the rest of the path, slashes included.
#[derive(Debug)]
pub struct PathConverter;

impl Converter for PathConverter {
    fn regex(&self) -> &str {
        "[^/].*?"
    }

    fn weight(&self) -> u32 {
        200
    }
}

#[derive(Debug)]
pub struct AnyConverter {
    regex: String,
}

impl AnyConverter {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = items.into_iter().map(|item| regex::escape(item.as_ref())).collect();
        Self { regex: format!("(?:{})", alternatives.join("|")) }
    }
}

impl Converter for AnyConverter {
    fn regex(&self) -> &str {
        &self.regex
    }
}

#[derive(Debug)]
pub struct UuidConverter;

impl Converter for UuidConverter {
    fn regex(&self) -> &str {
        "[A-Fa-f0-9]{8}-[A-Fa-f0-9]{4}-[A-Fa-f0-9]{4}-[A-Fa-f0-9]{4}-[A-Fa-f0-9]{12}"
    }
}

/// Matches a custom regular expression, e.g. `<regex('[a-z]+'):name>`.
#[derive(Debug)]
pub struct RegexConverter {
    regex: String,
}

impl RegexConverter {
    pub fn new<S: Into<String>>(regex: S) -> Self {
        Self { regex: regex.into() }
    }
}

impl Converter for RegexConverter {
    fn regex(&self) -> &str {
        &self.regex
    }
}

/// Optionally matches the port of a host, e.g. `localhost<port:port>`.
#[derive(Debug)]
pub struct PortConverter;

impl Converter for PortConverter {
    fn regex(&self) -> &str {
        "(?::[0-9]{1,5})?"
    }

    fn to_value(&self, raw: &str) -> Option<ArgValue> {
        match raw.strip_prefix(':') {
            Some(port) => port.parse::<i64>().ok().map(ArgValue::Int),
            None => Some(ArgValue::None),
        }
    }
}

pub type ConverterFactory = Arc<dyn Fn(&ConverterArgs) -> Result<Box<dyn Converter>, String> + Send + Sync>;

/// Converter factories by name.
#[derive(Clone)]
pub struct Converters {
    factories: HashMap<String, ConverterFactory>,
}

impl Converters {
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ConverterArgs) -> Result<Box<dyn Converter>, String> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiates converter `name` with the raw argument list of a rule variable.
    pub fn create(&self, name: &str, args: Option<&str>, pattern: &str) -> Result<Box<dyn Converter>, RouteError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RouteError::UnknownConverter { name: name.to_owned(), pattern: pattern.to_owned() })?;

        let args = match args {
            Some(source) => {
                ConverterArgs::parse(source).map_err(|reason| RouteError::invalid_converter_arguments(name, reason))?
            }
            None => ConverterArgs::default(),
        };

        factory(&args).map_err(|reason| RouteError::invalid_converter_arguments(name, reason))
    }
}

impl Default for Converters {
    fn default() -> Self {
        let mut converters = Self::empty();
        converters.register("default", |args| Ok(Box::new(StringConverter::from_args(args)?)));
        converters.register("string", |args| Ok(Box::new(StringConverter::from_args(args)?)));
        converters.register("int", |args| Ok(Box::new(IntConverter::from_args(args)?)));
        converters.register("float", |args| Ok(Box::new(FloatConverter::from_args(args)?)));
        converters.register("path", |_| Ok(Box::new(PathConverter)));
        converters.register("any", |args| {
            let items = args.strings()?;
            if items.is_empty() {
                return Err("any() needs at least one item".to_owned());
            }
            Ok(Box::new(AnyConverter::new(items)))
        });
        converters.register("uuid", |_| Ok(Box::new(UuidConverter)));
        converters.register("regex", |args| match args.positional().first() {
            Some(ArgLiteral::Str(regex)) => Ok(Box::new(RegexConverter::new(regex.clone()))),
            _ => Err("regex() needs the expression as first argument".to_owned()),
        });
        converters.register("port", |_| Ok(Box::new(PortConverter)));
        converters
    }
}

impl fmt::Debug for Converters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Converters").field("names", &names).finish()
    }
}
