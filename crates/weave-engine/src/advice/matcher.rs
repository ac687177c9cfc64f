//! Method selection for advice

use regex::Regex;
use weave_bytecode::TypeRef;

use crate::descriptor::MethodDescriptor;

/// Selects the methods an advice applies to
#[derive(Debug, Clone)]
pub enum MethodMatcher {
    /// Every overridable method
    Any,
    /// Methods with exactly this name
    Name(String),
    /// Methods whose name starts with this prefix
    Prefix(String),
    /// Methods whose name matches this regex
    Pattern(Regex),
    /// One exact overload
    Signature {
        /// Method name
        name: String,
        /// Parameter types
        params: Vec<TypeRef>,
    },
}

impl MethodMatcher {
    /// Exact name matcher
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Name prefix matcher
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// Regex matcher; anchor the pattern to match whole names
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    /// Exact overload matcher
    pub fn signature(name: impl Into<String>, params: Vec<TypeRef>) -> Self {
        Self::Signature {
            name: name.into(),
            params,
        }
    }

    /// Whether this matcher selects `method`
    pub fn matches(&self, method: &MethodDescriptor) -> bool {
        match self {
            Self::Any => true,
            Self::Name(name) => method.name() == name,
            Self::Prefix(prefix) => method.name().starts_with(prefix.as_str()),
            Self::Pattern(re) => re.is_match(method.name()),
            Self::Signature { name, params } => {
                method.name() == name && method.params() == params.as_slice()
            }
        }
    }

    /// Stable textual form used for fingerprinting
    pub fn canonical(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::Name(name) => format!("name:{}", name),
            Self::Prefix(prefix) => format!("prefix:{}", prefix),
            Self::Pattern(re) => format!("pattern:{}", re.as_str()),
            Self::Signature { name, params } => {
                let params: Vec<String> = params.iter().map(ToString::to_string).collect();
                format!("sig:{}({})", name, params.join(","))
            }
        }
    }
}

impl PartialEq for MethodMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for MethodMatcher {}
