//! The stack-based virtual machine that executes a compiled program.
//!
//! A flat instruction pointer, an explicit operand stack, a call stack
//! carrying return addresses, and a builtin table keyed by numeric id are
//! driven by a decode/execute/advance-pc loop. The value model is a tagged
//! `Value` rather than raw integers, there is a handler stack for
//! `try`/`catch`, and names are resolved at runtime (current call frame,
//! falling back to globals) instead of through index-addressed locals.

use crate::builtins;
use crate::container::Container;
use crate::error::RuntimeError;
use crate::opcode::Op;
use crate::value::Value;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DEFAULT_MAX_STACK: usize = 1024;
const DEFAULT_MAX_CALL_DEPTH: usize = 256;

struct CallFrame {
    return_addr: usize,
    saved_sp: usize,
    locals: HashMap<Rc<str>, Value>,
}

struct HandlerFrame {
    catch_addr: usize,
    sp_at_entry: usize,
    call_depth_at_entry: usize,
}

pub struct OakVm {
    code: Vec<u8>,
    strings: Vec<Rc<str>>,
    pc: usize,
    stack: Vec<Value>,
    call_stack: Vec<CallFrame>,
    handler_stack: Vec<HandlerFrame>,
    globals: HashMap<Rc<str>, Value>,
    current_line: u32,
    trace: bool,
    max_stack: usize,
    max_call_depth: usize,
    out: Box<dyn Write>,
    abort: Arc<AtomicBool>,
}

impl OakVm {
    pub fn new(container: Container) -> Result<Self, RuntimeError> {
        Self::with_writer(container, Box::new(io::stdout()))
    }

    /// Build a VM that writes `PRINT` output (and, eventually, any other
    /// stdout-shaped built-in output) to `out` instead of the process's
    /// real stdout. Tests use this to capture printed output in a `Vec<u8>`
    /// rather than scraping the process's actual stdout stream.
    pub fn with_writer(container: Container, out: Box<dyn Write>) -> Result<Self, RuntimeError> {
        let strings = container.decode_strings().map_err(|e| RuntimeError::Name {
            message: e.to_string(),
            line: 0,
        })?;
        Ok(OakVm {
            code: container.code,
            strings,
            pc: 0,
            stack: Vec::new(),
            call_stack: Vec::new(),
            handler_stack: Vec::new(),
            globals: HashMap::new(),
            current_line: 0,
            trace: false,
            max_stack: DEFAULT_MAX_STACK,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            out,
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// A handle the host can flip from another thread (or a signal handler)
    /// to cooperatively cancel a running program. The dispatch loop checks
    /// it between instructions; once set, `run()` returns
    /// `Err(RuntimeError::Abort)` at the next instruction boundary.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Run until `HALT` or an uncaught error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            match self.step() {
                Ok(true) => return Ok(()),
                Ok(false) => continue,
                Err(err) => {
                    if err.is_catchable() && self.unwind_to_handler(&err) {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Execute one instruction. Returns `Ok(true)` on `HALT`.
    fn step(&mut self) -> Result<bool, RuntimeError> {
        if self.abort.load(Ordering::Relaxed) {
            return Err(RuntimeError::Abort);
        }
        let op = self.fetch_op()?;
        if self.trace {
            log::trace!("{:04}: {}", self.pc - 1, op.mnemonic());
        }
        match op {
            Op::PushInt => {
                let v = self.fetch_i64()?;
                self.push(Value::Int(v))?;
            }
            Op::PushFloat => {
                let v = self.fetch_f64()?;
                self.push(Value::Float(v))?;
            }
            Op::PushBool => {
                let v = self.fetch_u8()?;
                self.push(Value::Bool(v != 0))?;
            }
            Op::PushNil => self.push(Value::Nil)?,
            Op::LoadConstStr => {
                let idx = self.fetch_u32()? as usize;
                let s = self.string_at(idx)?;
                self.push(Value::String(s))?;
            }
            Op::Load => {
                let idx = self.fetch_u32()? as usize;
                let name = self.string_at(idx)?;
                let value = self.load_var(&name)?;
                self.push(value)?;
            }
            Op::Store => {
                let idx = self.fetch_u32()? as usize;
                let name = self.string_at(idx)?;
                let value = self.pop()?;
                self.store_var(name, value);
            }
            Op::StoreConst => {
                let idx = self.fetch_u32()? as usize;
                let name = self.string_at(idx)?;
                let value = self.pop()?;
                self.store_var(name, value);
            }
            Op::Delete => {
                let idx = self.fetch_u32()? as usize;
                let name = self.string_at(idx)?;
                self.delete_var(&name);
            }
            Op::Add => self.binary_add()?,
            Op::Sub => self.binary_numeric(|a, b| a.wrapping_sub(b), |a, b| a - b)?,
            Op::Mul => self.binary_numeric(|a, b| a.wrapping_mul(b), |a, b| a * b)?,
            Op::Div => self.binary_div()?,
            Op::Mod => self.binary_mod()?,
            Op::Neg => self.unary_neg()?,
            Op::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a == b))?;
            }
            Op::Ne => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a != b))?;
            }
            Op::Lt => self.compare(|o| o.is_lt())?,
            Op::Le => self.compare(|o| o.is_le())?,
            Op::Gt => self.compare(|o| o.is_gt())?,
            Op::Ge => self.compare(|o| o.is_ge())?,
            Op::Not => {
                let v = self.pop()?;
                self.push(Value::Bool(!v.is_truthy()))?;
            }
            Op::Jump => {
                let target = self.fetch_u32()? as usize;
                self.pc = target;
            }
            Op::JumpIfFalse => {
                let target = self.fetch_u32()? as usize;
                let cond = self.pop()?;
                if !cond.is_truthy() {
                    self.pc = target;
                }
            }
            Op::JumpIfTrue => {
                let target = self.fetch_u32()? as usize;
                let cond = self.pop()?;
                if cond.is_truthy() {
                    self.pc = target;
                }
            }
            Op::CallBuiltin => {
                let id = self.fetch_u32()?;
                let argc = self.fetch_u8()? as usize;
                let args = self.pop_n(argc)?;
                let line = self.current_line;
                let result = builtins::call(id, args, line)?;
                self.push(result)?;
            }
            Op::CallUser => {
                let addr = self.fetch_u32()? as usize;
                let argc = self.fetch_u8()? as usize;
                self.call_user(addr, argc)?;
            }
            Op::Return => {
                let value = self.pop()?;
                self.do_return(value)?;
            }
            Op::PushHandler => {
                let addr = self.fetch_u32()? as usize;
                self.handler_stack.push(HandlerFrame {
                    catch_addr: addr,
                    sp_at_entry: self.stack.len(),
                    call_depth_at_entry: self.call_stack.len(),
                });
            }
            Op::PopHandler => {
                self.handler_stack.pop();
            }
            Op::Throw => {
                let value = self.pop()?;
                return Err(RuntimeError::UserThrown {
                    value,
                    line: self.current_line,
                });
            }
            Op::Print => {
                let value = self.pop()?;
                let _ = writeln!(self.out, "{value}");
            }
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let top = self.stack.last().cloned().ok_or(RuntimeError::Type {
                    message: "stack underflow on DUP".to_string(),
                    line: self.current_line,
                })?;
                self.push(top)?;
            }
            Op::Halt => return Ok(true),
            Op::Line => {
                self.current_line = self.fetch_u32()?;
            }
        }
        Ok(false)
    }

    // ---- fetch helpers ----------------------------------------------------

    fn fetch_op(&mut self) -> Result<Op, RuntimeError> {
        let byte = *self.code.get(self.pc).ok_or(RuntimeError::Abort)?;
        self.pc += 1;
        Op::from_byte(byte).ok_or(RuntimeError::Abort)
    }

    fn fetch_u8(&mut self) -> Result<u8, RuntimeError> {
        let b = *self.code.get(self.pc).ok_or(RuntimeError::Abort)?;
        self.pc += 1;
        Ok(b)
    }

    fn fetch_u32(&mut self) -> Result<u32, RuntimeError> {
        let bytes: [u8; 4] = self
            .code
            .get(self.pc..self.pc + 4)
            .ok_or(RuntimeError::Abort)?
            .try_into()
            .unwrap();
        self.pc += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    fn fetch_i64(&mut self) -> Result<i64, RuntimeError> {
        let bytes: [u8; 8] = self
            .code
            .get(self.pc..self.pc + 8)
            .ok_or(RuntimeError::Abort)?
            .try_into()
            .unwrap();
        self.pc += 8;
        Ok(i64::from_le_bytes(bytes))
    }

    fn fetch_f64(&mut self) -> Result<f64, RuntimeError> {
        let bytes: [u8; 8] = self
            .code
            .get(self.pc..self.pc + 8)
            .ok_or(RuntimeError::Abort)?
            .try_into()
            .unwrap();
        self.pc += 8;
        Ok(f64::from_le_bytes(bytes))
    }

    fn string_at(&self, idx: usize) -> Result<Rc<str>, RuntimeError> {
        self.strings
            .get(idx)
            .cloned()
            .ok_or_else(|| RuntimeError::Name {
                message: format!("missing data record {idx}"),
                line: self.current_line,
            })
    }

    // ---- stack helpers ------------------------------------------------

    fn push(&mut self, v: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.max_stack {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::Type {
            message: "stack underflow".to_string(),
            line: self.current_line,
        })
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        if self.stack.len() < n {
            return Err(RuntimeError::Type {
                message: "stack underflow".to_string(),
                line: self.current_line,
            });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    // ---- variables ------------------------------------------------------
    //
    // Reads check the innermost call frame, then fall back to globals, so a
    // function body can read outer/global state. Writes always land in the
    // innermost scope (the current call frame's locals, or globals at top
    // level) — OakScript has no closures, so a function can only ever
    // mutate its own locals or globals it assigns directly.

    fn load_var(&self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(frame) = self.call_stack.last() {
            if let Some(v) = frame.locals.get(name) {
                return Ok(v.clone());
            }
        }
        self.globals
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::Name {
                message: format!("undefined variable '{name}'"),
                line: self.current_line,
            })
    }

    fn store_var(&mut self, name: Rc<str>, value: Value) {
        if let Some(frame) = self.call_stack.last_mut() {
            frame.locals.insert(name, value);
        } else {
            self.globals.insert(name, value);
        }
    }

    fn delete_var(&mut self, name: &str) {
        if let Some(frame) = self.call_stack.last_mut() {
            frame.locals.remove(name);
        } else {
            self.globals.remove(name);
        }
    }

    // ---- arithmetic -----------------------------------------------------

    fn binary_add(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::String(_), _) | (_, Value::String(_)) => Value::as_string(format!("{a}{b}")),
            (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_add(*y)),
            (Value::Int(x), Value::Float(y)) => Value::Float(*x as f64 + y),
            (Value::Float(x), Value::Int(y)) => Value::Float(x + *y as f64),
            (Value::Float(x), Value::Float(y)) => Value::Float(x + y),
            _ => {
                return Err(RuntimeError::Type {
                    message: format!("cannot add {} and {}", a.type_name(), b.type_name()),
                    line: self.current_line,
                })
            }
        };
        self.push(result)
    }

    fn binary_numeric(
        &mut self,
        int_op: impl Fn(i64, i64) -> i64,
        float_op: impl Fn(f64, f64) -> f64,
    ) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(int_op(*x, *y)),
            (Value::Int(x), Value::Float(y)) => Value::Float(float_op(*x as f64, *y)),
            (Value::Float(x), Value::Int(y)) => Value::Float(float_op(*x, *y as f64)),
            (Value::Float(x), Value::Float(y)) => Value::Float(float_op(*x, *y)),
            _ => {
                return Err(RuntimeError::Type {
                    message: format!(
                        "expected two numbers, found {} and {}",
                        a.type_name(),
                        b.type_name()
                    ),
                    line: self.current_line,
                })
            }
        };
        self.push(result)
    }

    fn binary_div(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => {
                if *y == 0 {
                    return Err(RuntimeError::DivisionByZero {
                        line: self.current_line,
                    });
                }
                Value::Int(x.wrapping_div(*y))
            }
            (Value::Int(x), Value::Float(y)) => Value::Float(*x as f64 / y),
            (Value::Float(x), Value::Int(y)) => Value::Float(x / *y as f64),
            (Value::Float(x), Value::Float(y)) => Value::Float(x / y),
            _ => {
                return Err(RuntimeError::Type {
                    message: format!(
                        "expected two numbers, found {} and {}",
                        a.type_name(),
                        b.type_name()
                    ),
                    line: self.current_line,
                })
            }
        };
        self.push(result)
    }

    fn binary_mod(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => {
                if *y == 0 {
                    return Err(RuntimeError::DivisionByZero {
                        line: self.current_line,
                    });
                }
                Value::Int(x.wrapping_rem(*y))
            }
            (Value::Int(x), Value::Float(y)) => Value::Float((*x as f64) % y),
            (Value::Float(x), Value::Int(y)) => Value::Float(x % (*y as f64)),
            (Value::Float(x), Value::Float(y)) => Value::Float(x % y),
            _ => {
                return Err(RuntimeError::Type {
                    message: format!(
                        "expected two numbers, found {} and {}",
                        a.type_name(),
                        b.type_name()
                    ),
                    line: self.current_line,
                })
            }
        };
        self.push(result)
    }

    fn unary_neg(&mut self) -> Result<(), RuntimeError> {
        let v = self.pop()?;
        let result = match v {
            Value::Int(i) => Value::Int(i.wrapping_neg()),
            Value::Float(f) => Value::Float(-f),
            other => {
                return Err(RuntimeError::Type {
                    message: format!("cannot negate {}", other.type_name()),
                    line: self.current_line,
                })
            }
        };
        self.push(result)
    }

    /// Numeric ordering for `<`/`<=`/`>`/`>=`, with cross Int/Float
    /// promotion, and lexicographic ordering for strings. Booleans and
    /// `nil` aren't orderable.
    fn compare(&mut self, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let ordering = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Int(x), Value::Float(y)) => {
                (*x as f64).partial_cmp(y).ok_or_else(|| self.nan_error())?
            }
            (Value::Float(x), Value::Int(y)) => {
                x.partial_cmp(&(*y as f64)).ok_or_else(|| self.nan_error())?
            }
            (Value::Float(x), Value::Float(y)) => {
                x.partial_cmp(y).ok_or_else(|| self.nan_error())?
            }
            (Value::String(x), Value::String(y)) => x.as_ref().cmp(y.as_ref()),
            _ => {
                return Err(RuntimeError::Type {
                    message: format!("cannot compare {} and {}", a.type_name(), b.type_name()),
                    line: self.current_line,
                })
            }
        };
        self.push(Value::Bool(accept(ordering)))
    }

    fn nan_error(&self) -> RuntimeError {
        RuntimeError::Type {
            message: "comparison with NaN".to_string(),
            line: self.current_line,
        }
    }

    // ---- calls ------------------------------------------------------

    fn call_user(&mut self, addr: usize, argc: usize) -> Result<(), RuntimeError> {
        if self.call_stack.len() >= self.max_call_depth {
            return Err(RuntimeError::CallStackOverflow);
        }
        if self.stack.len() < argc {
            return Err(RuntimeError::Type {
                message: "stack underflow on call".to_string(),
                line: self.current_line,
            });
        }
        let saved_sp = self.stack.len() - argc;
        self.call_stack.push(CallFrame {
            return_addr: self.pc,
            saved_sp,
            locals: HashMap::new(),
        });
        self.pc = addr;
        Ok(())
    }

    fn do_return(&mut self, value: Value) -> Result<(), RuntimeError> {
        let frame = self.call_stack.pop().ok_or(RuntimeError::Type {
            message: "'return' with no active call".to_string(),
            line: self.current_line,
        })?;
        self.stack.truncate(frame.saved_sp);
        self.push(value)?;
        self.pc = frame.return_addr;
        Ok(())
    }

    /// On an uncaught, catchable error, unwind the operand and call stacks
    /// back to the state recorded when the nearest handler was pushed, push
    /// the error's caught value, and jump to its catch address. Returns
    /// `false` (propagate further) if no handler is registered.
    fn unwind_to_handler(&mut self, err: &RuntimeError) -> bool {
        let Some(handler) = self.handler_stack.pop() else {
            return false;
        };
        self.call_stack.truncate(handler.call_depth_at_entry);
        self.stack.truncate(handler.sp_at_entry);
        self.stack.push(err.as_caught_value());
        self.pc = handler.catch_addr;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Emitter;

    fn run_code(build: impl FnOnce(&mut Emitter)) -> OakVm {
        let mut e = Emitter::new();
        build(&mut e);
        e.emit(Op::Halt);
        let (code, data) = e.finish(1).unwrap();
        let mut vm = OakVm::new(Container::new(code, data)).unwrap();
        vm.run().unwrap();
        vm
    }

    #[test]
    fn arithmetic_precedence_leaves_expected_stack_effect() {
        // 2 + 3 * 4 == 14, then store into 'x'
        let vm = run_code(|e| {
            e.emit_push_int(2);
            e.emit_push_int(3);
            e.emit_push_int(4);
            e.emit(Op::Mul);
            e.emit(Op::Add);
            e.emit_store("x");
        });
        assert_eq!(vm.globals.get("x"), Some(&Value::Int(14)));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let mut e = Emitter::new();
        e.emit_push_int(1);
        e.emit_push_int(0);
        e.emit(Op::Div);
        e.emit(Op::Halt);
        let (code, data) = e.finish(1).unwrap();
        let mut vm = OakVm::new(Container::new(code, data)).unwrap();
        assert!(matches!(vm.run(), Err(RuntimeError::DivisionByZero { .. })));
    }

    #[test]
    fn string_plus_int_coerces_to_string() {
        let vm = run_code(|e| {
            e.emit_push_str("count: ");
            e.emit_push_int(5);
            e.emit(Op::Add);
            e.emit_store("msg");
        });
        assert_eq!(vm.globals.get("msg"), Some(&Value::as_string("count: 5")));
    }

    #[test]
    fn try_catch_routes_a_division_error_to_the_handler() {
        let mut e = Emitter::new();
        let catch = e.new_label();
        let end = e.new_label();
        e.emit_push_handler(catch);
        e.emit_push_int(1);
        e.emit_push_int(0);
        e.emit(Op::Div);
        e.emit(Op::PopHandler);
        e.emit_jump(Op::Jump, end);
        e.bind_label(catch);
        e.emit_store("err");
        e.bind_label(end);
        e.emit(Op::Halt);
        let (code, data) = e.finish(1).unwrap();
        let mut vm = OakVm::new(Container::new(code, data)).unwrap();
        vm.run().unwrap();
        assert!(matches!(vm.globals.get("err"), Some(Value::String(_))));
    }

    #[test]
    fn user_function_call_returns_and_restores_stack_depth() {
        let mut e = Emitter::new();
        let skip = e.new_label();
        e.emit_jump(Op::Jump, skip);
        let entry = e.declare_function("double", 1, 1).unwrap();
        e.bind_label(entry);
        e.emit_store("n");
        e.emit_load("n");
        e.emit_push_int(2);
        e.emit(Op::Mul);
        e.emit_return();
        e.bind_label(skip);

        e.emit_push_int(21);
        let label = e.reference_function("double");
        e.emit_call_user(label, 1);
        e.emit_store("result");
        e.emit(Op::Halt);

        let (code, data) = e.finish(1).unwrap();
        let mut vm = OakVm::new(Container::new(code, data)).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.globals.get("result"), Some(&Value::Int(42)));
        assert!(vm.stack.is_empty());
        assert!(vm.call_stack.is_empty());
    }
}
