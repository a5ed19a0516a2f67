//! Node classes of the archetype tree.

use std::fmt;

/// Syntactic class of an archetype node.
///
/// The reader accepts each class under its [`AstClass::name`]; attribute
/// conventions per class are described on the variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AstClass {
    Nil,
    Undef,
    True,
    False,
    /// `:value` holds the decimal text.
    Integer,
    Float,
    /// `:value` holds exactly one character.
    Char,
    String,

    Add,
    Sub,
    Mul,
    Div,
    Neg,

    IsEq,
    IsLt,
    IsLe,
    IsGt,
    IsGe,

    And,
    Or,
    Not,

    /// `(Set :identifier x expr)`
    Set,
    InplaceAdd,
    InplaceSub,
    InplaceMul,
    InplaceDiv,

    /// `(Deref receiver member)` where member is a `Name` or a `Call`.
    Deref,
    This,
    /// `:identifier`, dotted for namespace members.
    Name,
    /// `(Call :identifier f args...)`
    Call,
    /// `(New :type T args...)`
    New,

    Block,
    /// `(If cond then [else])`
    If,
    /// `(Cond (Case test body)... [default])`
    Cond,
    Case,
    /// `(While cond body)`
    While,
    /// `(Try body (Catch ...)...)`
    Try,
    /// `(Catch [:identifier e] [:type T] body...)`
    Catch,
    Raise,
    Return,

    /// `(Val :identifier x [:type T] expr)`
    Val,
    Var,
    /// `(Param :identifier x [:type T] [:binding var])`
    Param,
    /// `(Def :identifier f [:type T] (Param ...)* body...)`
    Def,
    /// `(DefClass :identifier C [:extends S] [:implements K] members...)`
    ///
    /// `:implements` names concepts, joined by `&`.
    DefClass,
    /// A composite without a root superclass, built with `New`.
    DefStruct,
    /// A singleton; its name evaluates to the one value.
    DefInstance,
    /// A singleton whose fields are its cases.
    DefEnum,
    /// `(DefConcept :identifier K (DefAction ...)*)`
    DefConcept,
    /// `(DefAction :identifier a [:type T] (Param ...)*)`
    DefAction,
    /// `(Init (Param ...)* [(Super args...)] body...)`
    Init,
    Super,
    /// `(DefStatic :identifier s [:type T] [:binding var] expr)`
    DefStatic,
    /// `(Namespace :identifier N definitions...)`
    Namespace,
    /// `(ImportModule :location L)`
    ImportModule,
    /// `(Using :url U [:alias A])`
    Using,
}

impl AstClass {
    pub const ALL: [AstClass; 56] = [
        Self::Nil,
        Self::Undef,
        Self::True,
        Self::False,
        Self::Integer,
        Self::Float,
        Self::Char,
        Self::String,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Neg,
        Self::IsEq,
        Self::IsLt,
        Self::IsLe,
        Self::IsGt,
        Self::IsGe,
        Self::And,
        Self::Or,
        Self::Not,
        Self::Set,
        Self::InplaceAdd,
        Self::InplaceSub,
        Self::InplaceMul,
        Self::InplaceDiv,
        Self::Deref,
        Self::This,
        Self::Name,
        Self::Call,
        Self::New,
        Self::Block,
        Self::If,
        Self::Cond,
        Self::Case,
        Self::While,
        Self::Try,
        Self::Catch,
        Self::Raise,
        Self::Return,
        Self::Val,
        Self::Var,
        Self::Param,
        Self::Def,
        Self::DefClass,
        Self::DefStruct,
        Self::DefInstance,
        Self::DefEnum,
        Self::DefConcept,
        Self::DefAction,
        Self::Init,
        Self::Super,
        Self::DefStatic,
        Self::Namespace,
        Self::ImportModule,
        Self::Using,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Nil => "Nil",
            Self::Undef => "Undef",
            Self::True => "True",
            Self::False => "False",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Char => "Char",
            Self::String => "String",
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::Div => "Div",
            Self::Neg => "Neg",
            Self::IsEq => "IsEq",
            Self::IsLt => "IsLt",
            Self::IsLe => "IsLe",
            Self::IsGt => "IsGt",
            Self::IsGe => "IsGe",
            Self::And => "And",
            Self::Or => "Or",
            Self::Not => "Not",
            Self::Set => "Set",
            Self::InplaceAdd => "InplaceAdd",
            Self::InplaceSub => "InplaceSub",
            Self::InplaceMul => "InplaceMul",
            Self::InplaceDiv => "InplaceDiv",
            Self::Deref => "Deref",
            Self::This => "This",
            Self::Name => "Name",
            Self::Call => "Call",
            Self::New => "New",
            Self::Block => "Block",
            Self::If => "If",
            Self::Cond => "Cond",
            Self::Case => "Case",
            Self::While => "While",
            Self::Try => "Try",
            Self::Catch => "Catch",
            Self::Raise => "Raise",
            Self::Return => "Return",
            Self::Val => "Val",
            Self::Var => "Var",
            Self::Param => "Param",
            Self::Def => "Def",
            Self::DefClass => "DefClass",
            Self::DefStruct => "DefStruct",
            Self::DefInstance => "DefInstance",
            Self::DefEnum => "DefEnum",
            Self::DefConcept => "DefConcept",
            Self::DefAction => "DefAction",
            Self::Init => "Init",
            Self::Super => "Super",
            Self::DefStatic => "DefStatic",
            Self::Namespace => "Namespace",
            Self::ImportModule => "ImportModule",
            Self::Using => "Using",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.name() == name)
    }

    /// Classes that declare a named symbol.
    pub fn is_definition(self) -> bool {
        self.is_composite()
            || matches!(
                self,
                Self::Def | Self::DefConcept | Self::DefStatic | Self::Namespace
            )
    }

    /// Classes that declare a class, struct, instance or enum.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            Self::DefClass | Self::DefStruct | Self::DefInstance | Self::DefEnum
        )
    }

    /// Classes allowed directly inside a namespace.
    pub fn is_namespace_member(self) -> bool {
        self.is_definition() || matches!(self, Self::ImportModule | Self::Using)
    }
}

impl fmt::Display for AstClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
