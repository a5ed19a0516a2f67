use rowan::TextRange;

/// Diagnostic kinds ordered by priority (highest priority first).
///
/// Reader errors come first: a malformed archetype makes every later
/// complaint about it noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticKind {
    // Archetype reader
    UnclosedNode,
    ExpectedNodeClass,
    ExpectedAttributeValue,
    UnknownNodeClass,
    BareValue,
    UnexpectedToken,
    MultipleRoots,
    MissingRoot,

    // Declarations and references
    DuplicateDefinition,
    UndefinedReference,
    MissingModule,
    InvalidSuperclass,
    UnexpectedNode,
    InvalidLiteral,

    // Typing
    IncompatibleTypes,
    NotAssignable,

    // Observations
    UnreachableCode,
}

impl DiagnosticKind {
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::UnreachableCode => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Whether this kind outranks `other`.
    pub fn suppresses(&self, other: &DiagnosticKind) -> bool {
        self < other
    }

    /// Default hint, included unless the call site adds its own.
    pub fn default_hint(&self) -> Option<&'static str> {
        match self {
            Self::BareValue => Some("values follow a `:key`, e.g. `:value \"1\"`"),
            Self::NotAssignable => Some("declare it with `Var` to allow assignment"),
            _ => None,
        }
    }

    pub fn fallback_message(&self) -> &'static str {
        match self {
            Self::UnclosedNode => "missing closing `)`",
            Self::ExpectedNodeClass => "expected a node class after `(`",
            Self::ExpectedAttributeValue => "expected an attribute value",
            Self::UnknownNodeClass => "unknown node class",
            Self::BareValue => "value without a key",
            Self::UnexpectedToken => "unexpected token",
            Self::MultipleRoots => "archetype has more than one root node",
            Self::MissingRoot => "archetype is empty",

            Self::DuplicateDefinition => "duplicate definition",
            Self::UndefinedReference => "undefined reference",
            Self::MissingModule => "module not found",
            Self::InvalidSuperclass => "invalid superclass",
            Self::UnexpectedNode => "unexpected AST node",
            Self::InvalidLiteral => "invalid literal",

            Self::IncompatibleTypes => "incompatible types",
            Self::NotAssignable => "cannot assign",

            Self::UnreachableCode => "unreachable code",
        }
    }

    /// Template for custom messages; `{}` is replaced by the caller's detail.
    pub fn custom_message(&self) -> String {
        match self {
            Self::UnknownNodeClass => "`{}` is not a node class".to_string(),
            Self::ExpectedAttributeValue => "expected a value for `:{}`".to_string(),
            Self::DuplicateDefinition => "`{}` is already defined".to_string(),
            Self::UndefinedReference => "`{}` is not defined".to_string(),
            Self::MissingModule => "module `{}` not found".to_string(),
            Self::NotAssignable => "cannot assign to `{}`".to_string(),
            Self::IncompatibleTypes => "incompatible types: {}".to_string(),
            Self::UnexpectedNode => "{}".to_string(),
            _ => format!("{}: {{}}", self.fallback_message()),
        }
    }

    /// `None` gives the fallback message, `Some(detail)` the filled template.
    pub fn message(&self, detail: Option<&str>) -> String {
        match detail {
            None => self.fallback_message().to_string(),
            Some(detail) => self.custom_message().replace("{}", detail),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedInfo {
    pub(crate) range: TextRange,
    pub(crate) message: String,
}

impl RelatedInfo {
    pub fn new(range: TextRange, message: impl Into<String>) -> Self {
        Self {
            range,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticMessage {
    pub(crate) kind: DiagnosticKind,
    pub(crate) range: TextRange,
    pub(crate) message: String,
    pub(crate) related: Vec<RelatedInfo>,
    pub(crate) hints: Vec<String>,
}

impl DiagnosticMessage {
    pub(crate) fn new(kind: DiagnosticKind, range: TextRange, message: impl Into<String>) -> Self {
        Self {
            kind,
            range,
            message: message.into(),
            related: Vec::new(),
            hints: Vec::new(),
        }
    }

    pub(crate) fn with_default_message(kind: DiagnosticKind, range: TextRange) -> Self {
        Self::new(kind, range, kind.fallback_message())
    }

    pub fn kind(&self) -> DiagnosticKind {
        self.kind
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.kind.default_severity()
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity() == Severity::Warning
    }

    /// Hints to render: the call site's, or the kind's default.
    pub(crate) fn effective_hints(&self) -> Vec<&str> {
        if self.hints.is_empty() {
            self.kind.default_hint().into_iter().collect()
        } else {
            self.hints.iter().map(String::as_str).collect()
        }
    }
}

impl std::fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}..{}: {}",
            self.severity(),
            u32::from(self.range.start()),
            u32::from(self.range.end()),
            self.message
        )?;
        for related in &self.related {
            write!(
                f,
                " (related: {} at {}..{})",
                related.message,
                u32::from(related.range.start()),
                u32::from(related.range.end())
            )?;
        }
        for hint in self.effective_hints() {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}
