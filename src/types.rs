//! Static type descriptors.
//!
//! A small type lattice used by native argument declarations and
//! diagnostics. `Any` sits at the top; `Number` is the parent of the
//! exact kinds, which the inexact kinds refine. [`TypeEnum::unify`]
//! resolves the least common ancestor of two types by alternating
//! supertype walks.

use std::fmt;

/// Known type values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeEnum {
    Any,
    Boolean,
    String,
    Character,
    Symbol,
    Bytevector,
    Number,
    ExactInteger,
    InexactInteger,
    ExactFloat,
    InexactFloat,
    Port,
    Lambda,
    Pair,
    List,
    Vector,
}

impl TypeEnum {
    /// The type's supertype. `Any` is its own supertype.
    pub fn super_type(self) -> TypeEnum {
        match self {
            TypeEnum::ExactInteger | TypeEnum::ExactFloat => TypeEnum::Number,
            TypeEnum::InexactInteger => TypeEnum::ExactInteger,
            TypeEnum::InexactFloat => TypeEnum::ExactFloat,
            _ => TypeEnum::Any,
        }
    }

    /// Resolve the closest common supertype of this and the argument.
    pub fn unify(self, o: TypeEnum) -> TypeEnum {
        let mut e = self;
        loop {
            let mut oi = o;
            loop {
                if e == oi {
                    return e;
                }
                if oi == TypeEnum::Any {
                    break;
                }
                oi = oi.super_type();
            }
            e = e.super_type();
        }
    }
}

impl fmt::Display for TypeEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeEnum::Any => "any",
            TypeEnum::Boolean => "bool",
            TypeEnum::String => "string",
            TypeEnum::Character => "char",
            TypeEnum::Symbol => "symbol",
            TypeEnum::Bytevector => "bytevector",
            TypeEnum::Number => "number",
            TypeEnum::ExactInteger => "#eint",
            TypeEnum::InexactInteger => "int",
            TypeEnum::ExactFloat => "#efloat",
            TypeEnum::InexactFloat => "float",
            TypeEnum::Port => "port",
            TypeEnum::Lambda => "lambda",
            TypeEnum::Pair => "pair",
            TypeEnum::List => "list",
            TypeEnum::Vector => "vector",
        };
        write!(f, "{name}")
    }
}

/// A structured type descriptor. Compound kinds carry their component
/// types; for the simple kinds the extra fields are unused.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeEnum,
    pub args: Vec<Type>,
    pub rest: Option<Box<Type>>,
    pub ret: Option<Box<Type>>,
    pub car: Option<Box<Type>>,
    pub cdr: Option<Box<Type>>,
    pub element: Option<Box<Type>>,
}

impl Type {
    pub fn simple(kind: TypeEnum) -> Type {
        Type {
            kind,
            args: Vec::new(),
            rest: None,
            ret: None,
            car: None,
            cdr: None,
            element: None,
        }
    }

    pub fn any() -> Type {
        Type::simple(TypeEnum::Any)
    }

    pub fn boolean() -> Type {
        Type::simple(TypeEnum::Boolean)
    }

    pub fn string() -> Type {
        Type::simple(TypeEnum::String)
    }

    pub fn character() -> Type {
        Type::simple(TypeEnum::Character)
    }

    pub fn symbol() -> Type {
        Type::simple(TypeEnum::Symbol)
    }

    pub fn bytevector() -> Type {
        Type::simple(TypeEnum::Bytevector)
    }

    pub fn number() -> Type {
        Type::simple(TypeEnum::Number)
    }

    pub fn exact_integer() -> Type {
        Type::simple(TypeEnum::ExactInteger)
    }

    pub fn inexact_integer() -> Type {
        Type::simple(TypeEnum::InexactInteger)
    }

    pub fn port() -> Type {
        Type::simple(TypeEnum::Port)
    }

    pub fn list_of(element: Type) -> Type {
        let mut t = Type::simple(TypeEnum::List);
        t.element = Some(Box::new(element));
        t
    }

    pub fn vector_of(element: Type) -> Type {
        let mut t = Type::simple(TypeEnum::Vector);
        t.element = Some(Box::new(element));
        t
    }

    pub fn pair_of(car: Type, cdr: Type) -> Type {
        let mut t = Type::simple(TypeEnum::Pair);
        t.car = Some(Box::new(car));
        t.cdr = Some(Box::new(cdr));
        t
    }

    pub fn lambda(args: Vec<Type>, rest: Option<Type>, ret: Type) -> Type {
        let mut t = Type::simple(TypeEnum::Lambda);
        t.args = args;
        t.rest = rest.map(Box::new);
        t.ret = Some(Box::new(ret));
        t
    }

    /// Structural type identity.
    pub fn is_a(&self, o: &Type) -> bool {
        if self.kind != o.kind {
            return false;
        }
        match self.kind {
            TypeEnum::Lambda => {
                if self.args.len() != o.args.len() {
                    return false;
                }
                for (a, b) in self.args.iter().zip(o.args.iter()) {
                    if !a.is_a(b) {
                        return false;
                    }
                }
                match (&self.rest, &o.rest) {
                    (Some(a), Some(b)) if !a.is_a(b) => return false,
                    (Some(_), None) | (None, Some(_)) => return false,
                    _ => {}
                }
                opt_is_a(&self.ret, &o.ret)
            }
            TypeEnum::Pair => opt_is_a(&self.car, &o.car) && opt_is_a(&self.cdr, &o.cdr),
            TypeEnum::List | TypeEnum::Vector => opt_is_a(&self.element, &o.element),
            _ => true,
        }
    }

    /// Tests if the type is a subtype of the argument type.
    pub fn is_kind_of(&self, o: &Type) -> bool {
        let mut e = self.kind;
        loop {
            if e == o.kind {
                break;
            }
            let n = e.super_type();
            if n == e {
                return false;
            }
            e = n;
        }
        if self.kind != o.kind {
            return true;
        }
        match self.kind {
            TypeEnum::Pair => opt_is_a(&self.car, &o.car) && opt_is_a(&self.cdr, &o.cdr),
            TypeEnum::List | TypeEnum::Vector => opt_is_a(&self.element, &o.element),
            _ => true,
        }
    }
}

fn opt_is_a(a: &Option<Box<Type>>, b: &Option<Box<Type>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_a(b),
        (None, None) => true,
        _ => false,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        match self.kind {
            TypeEnum::Lambda => {
                write!(f, "(")?;
                for (idx, arg) in self.args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                if let Some(rest) = &self.rest {
                    write!(f, " . {rest}")?;
                }
                write!(f, ")")?;
                if let Some(ret) = &self.ret {
                    write!(f, "{ret}")?;
                }
                Ok(())
            }
            TypeEnum::Pair => {
                let car = self.car.as_deref().cloned().unwrap_or_else(Type::any);
                let cdr = self.cdr.as_deref().cloned().unwrap_or_else(Type::any);
                write!(f, "({car},{cdr})")
            }
            TypeEnum::List | TypeEnum::Vector => {
                let e = self.element.as_deref().cloned().unwrap_or_else(Type::any);
                write!(f, "({e})")
            }
            _ => Ok(()),
        }
    }
}

/// Argument kind: required, optional (`[name]`) or rest (`name...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Fixed,
    Optional,
    Rest,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Fixed => "fixed",
            Kind::Optional => "optional",
            Kind::Rest => "rest",
        };
        write!(f, "{name}")
    }
}

/// Parse the type of a function argument based on naming conventions.
///
/// The declaration grammar is `[name]` for optional arguments,
/// `name...` for a rest argument, and `name<type>` for an explicit type
/// override. Without an override the argument name itself selects the
/// type by its leading token, e.g. `k` and `int` are integers, `x` and
/// `z` are numbers, `obj` is anything.
pub fn parse_arg(arg: &str) -> Result<(Type, String, Kind), String> {
    let mut s = arg;
    let mut kind = Kind::Fixed;

    if s.starts_with('[') && s.ends_with(']') && s.len() >= 2 {
        kind = Kind::Optional;
        s = &s[1..s.len() - 1];
    }
    if let Some(stripped) = s.strip_suffix("...") {
        kind = Kind::Rest;
        s = stripped;
    }

    let (name, type_name) = match s.find('<') {
        Some(i) if s.ends_with('>') => (&s[..i], &s[i + 1..s.len() - 1]),
        Some(_) => return Err(format!("malformed argument declaration: {arg}")),
        None => (s, s),
    };
    if name.is_empty() {
        return Err(format!("malformed argument declaration: {arg}"));
    }

    let typ = if type_name.starts_with("bool") {
        Type::boolean()
    } else if type_name.starts_with("bytevector") {
        Type::bytevector()
    } else if type_name.starts_with("char") {
        Type::character()
    } else if type_name.starts_with('k') || type_name == "int" {
        Type::inexact_integer()
    } else if type_name.starts_with("list") {
        Type::list_of(Type::any())
    } else if type_name.starts_with("obj")
        || type_name.starts_with("who")
        || type_name.starts_with("irritant")
        || type_name == "any"
    {
        Type::any()
    } else if type_name.starts_with("pair") {
        Type::pair_of(Type::any(), Type::any())
    } else if type_name.starts_with("port") {
        Type::port()
    } else if type_name.starts_with("string") || type_name.starts_with("message") {
        Type::string()
    } else if type_name.starts_with("sym") {
        Type::symbol()
    } else if type_name.starts_with("vector") {
        Type::vector_of(Type::any())
    } else if type_name.starts_with("proc") || type_name.starts_with("thunk") {
        Type::lambda(Vec::new(), Some(Type::any()), Type::any())
    } else if type_name.starts_with('x') || type_name.starts_with('z') {
        Type::number()
    } else if type_name.starts_with("start") || type_name.starts_with("end") {
        Type::inexact_integer()
    } else {
        return Err(format!("unsupported argument: {arg}"));
    };

    Ok((typ, name.to_string(), kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_chain() {
        assert_eq!(TypeEnum::InexactInteger.super_type(), TypeEnum::ExactInteger);
        assert_eq!(TypeEnum::ExactInteger.super_type(), TypeEnum::Number);
        assert_eq!(TypeEnum::Number.super_type(), TypeEnum::Any);
        assert_eq!(TypeEnum::Any.super_type(), TypeEnum::Any);
    }

    #[test]
    fn test_unify() {
        let cases = vec![
            (TypeEnum::InexactInteger, TypeEnum::InexactInteger, TypeEnum::InexactInteger),
            (TypeEnum::InexactInteger, TypeEnum::ExactInteger, TypeEnum::ExactInteger),
            (TypeEnum::InexactInteger, TypeEnum::InexactFloat, TypeEnum::Number),
            (TypeEnum::String, TypeEnum::Number, TypeEnum::Any),
            (TypeEnum::Any, TypeEnum::Pair, TypeEnum::Any),
        ];
        for (a, b, expected) in cases {
            assert_eq!(a.unify(b), expected, "{a} unify {b}");
            assert_eq!(b.unify(a), expected, "{b} unify {a}");
        }
    }

    #[test]
    fn test_parse_arg_declarations() {
        let cases = vec![
            ("obj", TypeEnum::Any, "obj", Kind::Fixed),
            ("[k:fill]", TypeEnum::InexactInteger, "k:fill", Kind::Optional),
            ("z1...", TypeEnum::Number, "z1", Kind::Rest),
            ("[z1]...", TypeEnum::Number, "z1", Kind::Rest),
            ("caller<string>", TypeEnum::String, "caller", Kind::Fixed),
            ("sym...", TypeEnum::Symbol, "sym", Kind::Rest),
            ("bytevector1", TypeEnum::Bytevector, "bytevector1", Kind::Fixed),
            ("start", TypeEnum::InexactInteger, "start", Kind::Fixed),
            ("message", TypeEnum::String, "message", Kind::Fixed),
        ];
        for (decl, kind, name, arg_kind) in cases {
            let (typ, parsed_name, parsed_kind) = parse_arg(decl).unwrap();
            assert_eq!(typ.kind, kind, "type of {decl}");
            assert_eq!(parsed_name, name, "name of {decl}");
            assert_eq!(parsed_kind, arg_kind, "kind of {decl}");
        }
        assert!(parse_arg("quux").is_err());
    }

    #[test]
    fn test_is_kind_of() {
        assert!(Type::inexact_integer().is_kind_of(&Type::number()));
        assert!(Type::inexact_integer().is_kind_of(&Type::any()));
        assert!(!Type::number().is_kind_of(&Type::inexact_integer()));
        assert!(Type::list_of(Type::any()).is_a(&Type::list_of(Type::any())));
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::number().to_string(), "number");
        assert_eq!(Type::list_of(Type::string()).to_string(), "list(string)");
        assert_eq!(
            Type::pair_of(Type::string(), Type::inexact_integer()).to_string(),
            "pair(string,int)"
        );
        assert_eq!(
            Type::lambda(vec![Type::number()], None, Type::boolean()).to_string(),
            "lambda(number)bool"
        );
    }
}
