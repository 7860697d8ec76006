//! Source-level type representation for Mini-C
//!
//! Two layers: `Type` is the full declarator tree the parser produces
//! (pointers, arrays, function signatures, named structs), while `DataType`
//! is the flat machine-level class carried on symbols and TAC operands.
//! Scalars and pointers are one machine word (4 bytes); arrays and structs
//! are laid out with no padding.

use std::fmt;

/// Machine word size in bytes. Every scalar and pointer occupies one word.
pub const WORD_SIZE: i32 = 4;

/// Flat data class of a symbol or expression result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Void,
    Int,
    Char,
    /// Marks struct-typed storage only; never the result class of an expression.
    Struct,
    Undef,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::Void => "void",
            DataType::Int => "int",
            DataType::Char => "char",
            DataType::Struct => "struct",
            DataType::Undef => "undefined",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Full declarator type as parsed from source.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Basic(DataType),
    Pointer(Box<Type>),
    Array { base: Box<Type>, size: i32 },
    Function { ret: Box<Type>, params: Vec<Type> },
    /// Reference to a declared struct type by name.
    Struct(String),
}

impl Type {
    pub fn basic(dt: DataType) -> Type {
        Type::Basic(dt)
    }

    pub fn pointer(base: Type) -> Type {
        Type::Pointer(Box::new(base))
    }

    pub fn array(base: Type, size: i32) -> Type {
        Type::Array {
            base: Box::new(base),
            size,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    /// The flat data class this type reduces to on a TAC operand.
    ///
    /// Pointers and arrays reduce to their element class; a value loaded
    /// through them is a scalar of that class.
    pub fn data_type(&self) -> DataType {
        match self {
            Type::Basic(dt) => *dt,
            Type::Pointer(base) => base.data_type(),
            Type::Array { base, .. } => base.data_type(),
            Type::Function { ret, .. } => ret.data_type(),
            Type::Struct(_) => DataType::Struct,
        }
    }

    /// Innermost element type of a (possibly multi-dimensional) array.
    pub fn array_base(&self) -> &Type {
        match self {
            Type::Array { base, .. } => base.array_base(),
            other => other,
        }
    }

    /// Dimension sizes from outermost to innermost; empty for non-arrays.
    pub fn array_dims(&self) -> Vec<i32> {
        let mut dims = Vec::new();
        let mut cur = self;
        while let Type::Array { base, size } = cur {
            dims.push(*size);
            cur = base;
        }
        dims
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(dt) => write!(f, "{}", dt),
            Type::Pointer(base) => write!(f, "{}*", base),
            Type::Array { base, size } => write!(f, "{}[{}]", base, size),
            Type::Function { ret, params } => {
                write!(f, "{}(", ret)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            Type::Struct(name) => write!(f, "struct {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_of_nested_declarators() {
        let t = Type::pointer(Type::basic(DataType::Char));
        assert_eq!(t.data_type(), DataType::Char);

        let t = Type::array(Type::array(Type::basic(DataType::Int), 10), 5);
        assert_eq!(t.data_type(), DataType::Int);
        assert_eq!(t.array_dims(), vec![5, 10]);
        assert_eq!(t.array_base(), &Type::basic(DataType::Int));
    }

    #[test]
    fn display_forms() {
        let t = Type::array(Type::basic(DataType::Char), 8);
        assert_eq!(t.to_string(), "char[8]");
        assert_eq!(Type::Struct("point".into()).to_string(), "struct point");
    }
}
