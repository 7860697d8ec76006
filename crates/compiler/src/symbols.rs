//! Symbols and symbol tables
//!
//! All symbols live in one arena owned by [`SymTable`] and are referenced by
//! [`SymId`] everywhere else (TAC operands, register descriptors, block
//! metadata). Name resolution goes through two maps, a persistent global one
//! and a local one that is cleared on scope exit. Integer, character and
//! text-literal constants are interned so the same literal always resolves
//! to the same symbol; constants manufactured by the optimizer bypass the
//! interner and stay anonymous.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::types::{DataType, Type, WORD_SIZE};

/// Index of a symbol in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    Undef,
    Var,
    Func,
    Text,
    Label,
    ConstInt,
    ConstChar,
    StructType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Global
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymValue {
    None,
    Int(i32),
    Char(char),
    /// Text literal, stored with its surrounding quotes still present.
    Text(String),
}

/// Dimension and element-size information for array variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayInfo {
    /// Dimension sizes from outermost to innermost.
    pub dims: Vec<i32>,
    pub element_size: i32,
    pub base_type: DataType,
}

impl ArrayInfo {
    pub fn total_elements(&self) -> i32 {
        self.dims.iter().product()
    }

    pub fn byte_size(&self) -> i32 {
        self.total_elements() * self.element_size
    }
}

/// One field of a declared struct type, with its computed offset.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
    pub offset: i32,
}

/// Layout of a declared struct type: fields in declaration order, no padding.
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<StructField>,
    pub total_size: i32,
}

impl StructLayout {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Sym {
    pub kind: SymKind,
    pub data_type: DataType,
    pub scope: Scope,
    pub name: String,
    pub value: SymValue,
    /// Frame or static offset; assigned exactly once, during code generation.
    pub offset: Option<i32>,
    /// Numeric id of a text literal, printed as `L<n>`.
    pub text_label: Option<u32>,
    // Function signature.
    pub param_types: Vec<DataType>,
    pub return_type: DataType,
    // Storage shape.
    pub is_pointer: bool,
    pub array: Option<ArrayInfo>,
    pub layout: Option<Rc<StructLayout>>,
}

impl Sym {
    fn new(kind: SymKind, name: impl Into<String>, data_type: DataType, scope: Scope) -> Sym {
        Sym {
            kind,
            data_type,
            scope,
            name: name.into(),
            value: SymValue::None,
            offset: None,
            text_label: None,
            param_types: Vec::new(),
            return_type: DataType::Undef,
            is_pointer: false,
            array: None,
            layout: None,
        }
    }

    /// Integer value of a constant symbol; characters widen to their code.
    pub fn const_value(&self) -> Option<i32> {
        match (&self.kind, &self.value) {
            (SymKind::ConstInt, SymValue::Int(v)) => Some(*v),
            (SymKind::ConstChar, SymValue::Char(c)) => Some(*c as i32),
            _ => None,
        }
    }

    /// Storage size in bytes when declared as a variable.
    pub fn size(&self) -> i32 {
        if let Some(array) = &self.array {
            array.byte_size()
        } else if let Some(layout) = &self.layout {
            if self.data_type == DataType::Struct {
                layout.total_size
            } else {
                WORD_SIZE
            }
        } else {
            WORD_SIZE
        }
    }

    /// Operand spelling used in TAC listings.
    pub fn display_name(&self) -> String {
        match self.kind {
            SymKind::Var | SymKind::Func | SymKind::Label | SymKind::StructType => {
                self.name.clone()
            }
            SymKind::Text => match self.text_label {
                Some(label) => format!("L{}", label),
                None => self.name.clone(),
            },
            SymKind::ConstInt => match self.value {
                SymValue::Int(v) => v.to_string(),
                _ => self.name.clone(),
            },
            SymKind::ConstChar => match self.value {
                SymValue::Char(c) => format!("'{}'", c),
                _ => self.name.clone(),
            },
            SymKind::Undef => "?".to_string(),
        }
    }
}

/// Arena plus scoped name maps.
#[derive(Debug, Default)]
pub struct SymTable {
    syms: Vec<Sym>,
    global: HashMap<String, SymId>,
    local: HashMap<String, SymId>,
    struct_types: HashMap<String, SymId>,
    const_ints: HashMap<i32, SymId>,
    const_chars: HashMap<char, SymId>,
    texts: HashMap<String, SymId>,
    scope: Scope,
}

impl SymTable {
    pub fn new() -> SymTable {
        SymTable::default()
    }

    pub fn sym(&self, id: SymId) -> &Sym {
        &self.syms[id.0 as usize]
    }

    pub fn sym_mut(&mut self, id: SymId) -> &mut Sym {
        &mut self.syms[id.0 as usize]
    }

    fn alloc(&mut self, sym: Sym) -> SymId {
        let id = SymId(self.syms.len() as u32);
        self.syms.push(sym);
        id
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn enter_scope(&mut self) {
        self.scope = Scope::Local;
        self.local.clear();
    }

    pub fn leave_scope(&mut self) {
        self.scope = Scope::Global;
        self.local.clear();
    }

    /// Whether a name is already declared in the *current* scope. Locals may
    /// shadow globals; duplicates within one scope are the caller's error.
    pub fn declared_in_scope(&self, name: &str) -> Option<SymId> {
        let map = if self.scope == Scope::Local {
            &self.local
        } else {
            &self.global
        };
        map.get(name).copied()
    }

    /// Resolve a name: the local table shadows the global one.
    pub fn lookup(&self, name: &str) -> Option<SymId> {
        if self.scope == Scope::Local {
            if let Some(id) = self.local.get(name) {
                return Some(*id);
            }
        }
        self.global.get(name).copied()
    }

    /// Insert a variable symbol into the table for the current scope.
    /// The caller is responsible for duplicate checking via [`lookup`].
    ///
    /// [`lookup`]: SymTable::lookup
    pub fn insert_var(&mut self, name: &str, data_type: DataType) -> SymId {
        let scope = self.scope;
        let id = self.alloc(Sym::new(SymKind::Var, name, data_type, scope));
        let map = if scope == Scope::Local {
            &mut self.local
        } else {
            &mut self.global
        };
        map.insert(name.to_string(), id);
        id
    }

    /// Insert a function symbol into the global table.
    pub fn insert_func(&mut self, name: &str, return_type: DataType) -> SymId {
        let mut sym = Sym::new(SymKind::Func, name, return_type, Scope::Global);
        sym.return_type = return_type;
        let id = self.alloc(sym);
        self.global.insert(name.to_string(), id);
        id
    }

    /// Interned integer constant: the same value always yields the same symbol.
    pub fn intern_int(&mut self, value: i32) -> SymId {
        if let Some(id) = self.const_ints.get(&value) {
            return *id;
        }
        let mut sym = Sym::new(SymKind::ConstInt, value.to_string(), DataType::Int, Scope::Global);
        sym.value = SymValue::Int(value);
        let id = self.alloc(sym);
        self.const_ints.insert(value, id);
        id
    }

    /// Interned character constant.
    pub fn intern_char(&mut self, value: char) -> SymId {
        if let Some(id) = self.const_chars.get(&value) {
            return *id;
        }
        let mut sym = Sym::new(
            SymKind::ConstChar,
            format!("'{}'", value),
            DataType::Char,
            Scope::Global,
        );
        sym.value = SymValue::Char(value);
        let id = self.alloc(sym);
        self.const_chars.insert(value, id);
        id
    }

    /// Anonymous constant used by the optimizer; never interned, never named
    /// in any table.
    pub fn ephemeral_int(&mut self, value: i32) -> SymId {
        let mut sym = Sym::new(SymKind::ConstInt, value.to_string(), DataType::Int, Scope::Global);
        sym.value = SymValue::Int(value);
        self.alloc(sym)
    }

    pub fn find_text(&self, text: &str) -> Option<SymId> {
        self.texts.get(text).copied()
    }

    /// Insert a text literal (quotes included) under the given `L<n>` label.
    pub fn insert_text(&mut self, text: &str, label: u32) -> SymId {
        let mut sym = Sym::new(SymKind::Text, text, DataType::Char, Scope::Global);
        sym.value = SymValue::Text(text.to_string());
        sym.text_label = Some(label);
        let id = self.alloc(sym);
        self.texts.insert(text.to_string(), id);
        id
    }

    /// Label symbols are referenced only from TAC operands, never by name
    /// lookup, so they live in the arena without a table entry.
    pub fn alloc_label(&mut self, name: impl Into<String>) -> SymId {
        let scope = self.scope;
        self.alloc(Sym::new(SymKind::Label, name, DataType::Undef, scope))
    }

    /// A bare function-name symbol for a CALL operand (the callee may be
    /// undeclared; the reference is by name only).
    pub fn alloc_func_ref(&mut self, name: &str) -> SymId {
        self.alloc(Sym::new(SymKind::Func, name, DataType::Undef, Scope::Global))
    }

    pub fn declare_struct_type(&mut self, layout: StructLayout) -> SymId {
        let name = layout.name.clone();
        let mut sym = Sym::new(SymKind::StructType, name.clone(), DataType::Struct, Scope::Global);
        sym.layout = Some(Rc::new(layout));
        let id = self.alloc(sym);
        self.struct_types.insert(name, id);
        id
    }

    pub fn struct_type(&self, name: &str) -> Option<&Rc<StructLayout>> {
        let id = self.struct_types.get(name)?;
        self.sym(*id).layout.as_ref()
    }

    /// Byte size of a declarator type, resolving struct names through the
    /// table. Unknown structs fall back to one word.
    pub fn type_size(&self, ty: &Type) -> i32 {
        match ty {
            Type::Basic(_) | Type::Pointer(_) | Type::Function { .. } => WORD_SIZE,
            Type::Array { base, size } => self.type_size(base) * (*size).max(0),
            Type::Struct(name) => self
                .struct_type(name)
                .map(|layout| layout.total_size)
                .unwrap_or(WORD_SIZE),
        }
    }

    /// Compute a struct layout from parsed fields: declaration order, no
    /// padding, each field recording its offset.
    pub fn layout_struct(&self, name: &str, fields: &[(String, Type)]) -> StructLayout {
        let mut layout = StructLayout {
            name: name.to_string(),
            fields: Vec::with_capacity(fields.len()),
            total_size: 0,
        };
        for (field_name, ty) in fields {
            let size = self.type_size(ty);
            layout.fields.push(StructField {
                name: field_name.clone(),
                ty: ty.clone(),
                offset: layout.total_size,
            });
            layout.total_size += size;
        }
        layout
    }

    /// Text literals in label order, for the static data section.
    pub fn text_symbols(&self) -> Vec<SymId> {
        let mut ids: Vec<SymId> = self.texts.values().copied().collect();
        ids.sort_by_key(|id| self.sym(*id).text_label);
        ids
    }

    /// Render the global symbol table, sorted by name. Local symbols are not
    /// listed; the local table is empty outside function scopes.
    pub fn format_globals(&self) -> String {
        let mut entries: Vec<(&String, SymId)> = self
            .global
            .iter()
            .map(|(name, id)| (name, *id))
            .chain(self.struct_types.iter().map(|(name, id)| (name, *id)))
            .collect();
        entries.sort();

        let mut out = String::new();
        out.push_str("=== Global Symbol Table ===\n");
        for (name, id) in entries {
            let sym = self.sym(id);
            let _ = write!(out, "{:>8} : ", name);
            match sym.kind {
                SymKind::Var => {
                    let _ = write!(out, "VAR[{}]", sym.data_type);
                    if let Some(offset) = sym.offset {
                        let _ = write!(out, " @{}", offset);
                    }
                }
                SymKind::Func => {
                    let _ = write!(out, "FUNC[{}](", sym.return_type);
                    for (i, p) in sym.param_types.iter().enumerate() {
                        if i > 0 {
                            let _ = write!(out, ", ");
                        }
                        let _ = write!(out, "{}", p);
                    }
                    let _ = write!(out, ")");
                }
                SymKind::ConstInt => {
                    let _ = write!(out, "CONST_INT = {}", sym.display_name());
                }
                SymKind::ConstChar => {
                    let _ = write!(out, "CONST_CHAR = {}", sym.display_name());
                }
                SymKind::Text => {
                    let _ = write!(out, "TEXT @{}", sym.display_name());
                }
                SymKind::StructType => {
                    let size = sym.layout.as_ref().map(|l| l.total_size).unwrap_or(0);
                    let _ = write!(out, "STRUCT[{} bytes]", size);
                }
                _ => {
                    let _ = write!(out, "UNKNOWN");
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_interned() {
        let mut table = SymTable::new();
        let a = table.intern_int(42);
        let b = table.intern_int(42);
        let c = table.intern_int(7);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.sym(a).const_value(), Some(42));

        let x = table.intern_char('x');
        let y = table.intern_char('x');
        assert_eq!(x, y);
        assert_eq!(table.sym(x).const_value(), Some('x' as i32));
    }

    #[test]
    fn ephemeral_constants_are_not_shared() {
        let mut table = SymTable::new();
        let interned = table.intern_int(5);
        let eph = table.ephemeral_int(5);
        assert_ne!(interned, eph);
        // A later intern of the same value still finds the original.
        assert_eq!(table.intern_int(5), interned);
    }

    #[test]
    fn local_scope_shadows_and_clears() {
        let mut table = SymTable::new();
        let g = table.insert_var("x", DataType::Int);
        table.enter_scope();
        let l = table.insert_var("x", DataType::Char);
        assert_eq!(table.lookup("x"), Some(l));
        table.leave_scope();
        assert_eq!(table.lookup("x"), Some(g));
    }

    #[test]
    fn struct_layout_offsets() {
        let mut table = SymTable::new();
        let fields = vec![
            ("x".to_string(), Type::basic(DataType::Int)),
            ("tag".to_string(), Type::basic(DataType::Char)),
            ("buf".to_string(), Type::array(Type::basic(DataType::Int), 3)),
        ];
        let layout = table.layout_struct("point", &fields);
        assert_eq!(layout.fields[0].offset, 0);
        assert_eq!(layout.fields[1].offset, 4);
        assert_eq!(layout.fields[2].offset, 8);
        assert_eq!(layout.total_size, 20);

        table.declare_struct_type(layout);
        assert_eq!(table.type_size(&Type::Struct("point".into())), 20);
        // Nested use of the registered struct.
        let outer = table.layout_struct(
            "pair",
            &[
                ("a".to_string(), Type::Struct("point".into())),
                ("b".to_string(), Type::Struct("point".into())),
            ],
        );
        assert_eq!(outer.fields[1].offset, 20);
        assert_eq!(outer.total_size, 40);
    }

    #[test]
    fn text_symbols_sorted_by_label() {
        let mut table = SymTable::new();
        table.insert_text("\"b\"", 3);
        table.insert_text("\"a\"", 1);
        let texts = table.text_symbols();
        assert_eq!(table.sym(texts[0]).text_label, Some(1));
        assert_eq!(table.sym(texts[1]).text_label, Some(3));
    }

    #[test]
    fn array_size_on_symbol() {
        let mut table = SymTable::new();
        let id = table.insert_var("a", DataType::Int);
        table.sym_mut(id).array = Some(ArrayInfo {
            dims: vec![5, 10],
            element_size: 4,
            base_type: DataType::Int,
        });
        assert_eq!(table.sym(id).size(), 200);
    }
}
