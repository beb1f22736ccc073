//! The bytecode emitter: a growable code buffer, a growable string-data
//! buffer with deduplication, a label/patch table for forward jumps, and a
//! symbol scope for named procedures.
//!
//! A label is either `Pending` (forward target, offsets waiting) or `Bound`
//! (offset known); binding drains the pending list and overwrites each jump
//! site in place, which lets a call site reference a function (or a loop
//! reference a jump target) before its address is known.

use crate::error::EmitError;
use crate::opcode::Op;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelId(usize);

enum LabelState {
    Pending(Vec<usize>),
    Bound(u32),
}

struct FunctionSym {
    label: LabelId,
    arity: usize,
    defined: bool,
}

pub struct Emitter {
    code: Vec<u8>,
    data: Vec<u8>,
    string_index: HashMap<Rc<str>, u32>,
    strings: Vec<Rc<str>>,
    labels: Vec<LabelState>,
    functions: HashMap<String, FunctionSym>,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            code: Vec::new(),
            data: Vec::new(),
            string_index: HashMap::new(),
            strings: Vec::new(),
            labels: Vec::new(),
            functions: HashMap::new(),
        }
    }

    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    /// Intern a string into the data section, deduplicating identical
    /// literals so that two identical string literals share one
    /// data-section record.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.string_index.get(s) {
            return idx;
        }
        let rc: Rc<str> = Rc::from(s);
        let idx = self.strings.len() as u32;
        self.data
            .extend_from_slice(&(rc.len() as u32).to_le_bytes());
        self.data.extend_from_slice(rc.as_bytes());
        self.strings.push(rc.clone());
        self.string_index.insert(rc, idx);
        idx
    }

    fn push_op(&mut self, op: Op) {
        self.code.push(op as u8);
    }

    pub fn emit_push_int(&mut self, v: i64) {
        self.push_op(Op::PushInt);
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    pub fn emit_push_float(&mut self, v: f64) {
        self.push_op(Op::PushFloat);
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    pub fn emit_push_bool(&mut self, v: bool) {
        self.push_op(Op::PushBool);
        self.code.push(v as u8);
    }

    pub fn emit_push_nil(&mut self) {
        self.push_op(Op::PushNil);
    }

    pub fn emit_push_str(&mut self, s: &str) {
        let idx = self.intern(s);
        self.push_op(Op::LoadConstStr);
        self.code.extend_from_slice(&idx.to_le_bytes());
    }

    fn emit_name_op(&mut self, op: Op, name: &str) {
        let idx = self.intern(name);
        self.push_op(op);
        self.code.extend_from_slice(&idx.to_le_bytes());
    }

    pub fn emit_load(&mut self, name: &str) {
        self.emit_name_op(Op::Load, name);
    }

    pub fn emit_store(&mut self, name: &str) {
        self.emit_name_op(Op::Store, name);
    }

    pub fn emit_store_const(&mut self, name: &str) {
        self.emit_name_op(Op::StoreConst, name);
    }

    /// Emit a zero-operand instruction: arithmetic, comparison, logical,
    /// stack utility, or handler opcodes.
    pub fn emit(&mut self, op: Op) {
        debug_assert_eq!(op.immediate_len(), 0, "{op:?} takes an operand");
        self.push_op(op);
    }

    pub fn emit_line(&mut self, line: u32) {
        self.push_op(Op::Line);
        self.code.extend_from_slice(&line.to_le_bytes());
    }

    pub fn emit_call_builtin(&mut self, builtin_id: u32, argc: u8) {
        self.push_op(Op::CallBuiltin);
        self.code.extend_from_slice(&builtin_id.to_le_bytes());
        self.code.push(argc);
    }

    /// `RETURN` always pops exactly one value: callers of a bare `return`
    /// push a `nil` first so the call site's invariant ("every call leaves
    /// exactly one value") holds uniformly.
    pub fn emit_return(&mut self) {
        self.push_op(Op::Return);
    }

    // ---- labels -------------------------------------------------------

    pub fn new_label(&mut self) -> LabelId {
        self.labels.push(LabelState::Pending(Vec::new()));
        LabelId(self.labels.len() - 1)
    }

    fn patch_u32(&mut self, offset: usize, value: u32) {
        self.code[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Write a 4-byte placeholder for `label`'s address, recording the site
    /// for later patching if the label isn't bound yet.
    fn write_label_operand(&mut self, label: LabelId) {
        let site = self.code.len();
        self.code.extend_from_slice(&0u32.to_le_bytes());
        match &mut self.labels[label.0] {
            LabelState::Bound(addr) => {
                let addr = *addr;
                self.patch_u32(site, addr);
            }
            LabelState::Pending(sites) => sites.push(site),
        }
    }

    /// Bind `label` to the current code offset, draining and filling every
    /// patch site recorded against it.
    pub fn bind_label(&mut self, label: LabelId) {
        let addr = self.code.len() as u32;
        let old = std::mem::replace(&mut self.labels[label.0], LabelState::Bound(addr));
        if let LabelState::Pending(sites) = old {
            for site in sites {
                self.patch_u32(site, addr);
            }
        }
    }

    pub fn emit_jump(&mut self, op: Op, label: LabelId) {
        debug_assert!(matches!(op, Op::Jump | Op::JumpIfFalse | Op::JumpIfTrue));
        self.push_op(op);
        self.write_label_operand(label);
    }

    pub fn emit_push_handler(&mut self, label: LabelId) {
        self.push_op(Op::PushHandler);
        self.write_label_operand(label);
    }

    pub fn emit_call_user(&mut self, label: LabelId, argc: u8) {
        self.push_op(Op::CallUser);
        self.write_label_operand(label);
        self.code.push(argc);
    }

    // ---- function symbols ----------------------------------------------

    /// Look up or forward-declare a reference to `name` at a call site. The
    /// returned label is unresolved until `declare_function` binds it.
    pub fn reference_function(&mut self, name: &str) -> LabelId {
        if let Some(sym) = self.functions.get(name) {
            sym.label
        } else {
            let label = self.new_label();
            self.functions.insert(
                name.to_string(),
                FunctionSym {
                    label,
                    arity: 0,
                    defined: false,
                },
            );
            label
        }
    }

    /// Declare `name`'s definition site (its entry label), checking for
    /// redefinition. Arity is recorded for informational/debugging use; the
    /// VM does not itself enforce call arity against it (spec only requires
    /// built-ins to enforce arity).
    pub fn declare_function(
        &mut self,
        name: &str,
        arity: usize,
        line: u32,
    ) -> Result<LabelId, EmitError> {
        if let Some(sym) = self.functions.get_mut(name) {
            if sym.defined {
                return Err(EmitError::DuplicateFunction {
                    line,
                    name: name.to_string(),
                });
            }
            sym.defined = true;
            sym.arity = arity;
            Ok(sym.label)
        } else {
            let label = self.new_label();
            self.functions.insert(
                name.to_string(),
                FunctionSym {
                    label,
                    arity,
                    defined: true,
                },
            );
            Ok(label)
        }
    }

    /// Finish compilation: verify every label is bound and every referenced
    /// function was defined, then hand back the code and data sections.
    pub fn finish(self, line: u32) -> Result<(Vec<u8>, Vec<u8>), EmitError> {
        for (name, sym) in self.functions.iter() {
            if !sym.defined {
                return Err(EmitError::UndefinedFunction {
                    line,
                    name: name.clone(),
                });
            }
        }
        for (id, state) in self.labels.iter().enumerate() {
            if let LabelState::Pending(sites) = state {
                if !sites.is_empty() {
                    return Err(EmitError::UnboundLabel(id as u32));
                }
            }
        }
        Ok((self.code, self.data))
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates_identical_strings() {
        let mut e = Emitter::new();
        let a = e.intern("hello");
        let b = e.intern("world");
        let c = e.intern("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn forward_jump_is_patched_on_bind() {
        let mut e = Emitter::new();
        let label = e.new_label();
        e.emit_jump(Op::Jump, label);
        let site = 1; // opcode byte then 4-byte operand
        assert_eq!(&e.code[site..site + 4], &0u32.to_le_bytes());
        e.bind_label(label);
        let addr = e.code_len() as u32;
        assert_eq!(&e.code[site..site + 4], &addr.to_le_bytes());
    }

    #[test]
    fn backward_jump_resolves_immediately() {
        let mut e = Emitter::new();
        let top = e.new_label();
        e.bind_label(top);
        let addr_before = e.code_len() as u32;
        e.emit(Op::Pop);
        e.emit_jump(Op::Jump, top);
        let site = e.code_len() - 4;
        assert_eq!(&e.code[site..site + 4], &addr_before.to_le_bytes());
    }

    #[test]
    fn finish_rejects_unbound_label() {
        let mut e = Emitter::new();
        let label = e.new_label();
        e.emit_jump(Op::Jump, label);
        assert!(matches!(
            e.finish(1),
            Err(EmitError::UnboundLabel(_))
        ));
    }

    #[test]
    fn finish_rejects_undefined_function_reference() {
        let mut e = Emitter::new();
        e.reference_function("f");
        assert!(matches!(
            e.finish(1),
            Err(EmitError::UndefinedFunction { .. })
        ));
    }

    #[test]
    fn redefining_a_function_is_an_error() {
        let mut e = Emitter::new();
        e.declare_function("f", 0, 1).unwrap();
        assert!(matches!(
            e.declare_function("f", 0, 2),
            Err(EmitError::DuplicateFunction { .. })
        ));
    }
}
