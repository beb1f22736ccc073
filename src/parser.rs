//! Recursive-descent parser over the include-expanded token stream, driving
//! the emitter directly as it recognizes each construct — there is no
//! persisted AST; each grammar rule emits its bytecode as it goes.
//!
//! One token of lookahead (`self.cur`) is all the grammar below ever needs.

use crate::builtins;
use crate::emitter::{Emitter, LabelId};
use crate::error::{CompileError, EmitError, ParseError};
use crate::include::Includer;
use crate::opcode::Op;
use crate::token::{Keyword, Punct, Token};
use std::collections::HashSet;

struct LoopCtx {
    break_label: LabelId,
    continue_label: LabelId,
}

pub struct Parser {
    includer: Includer,
    cur: Token,
    cur_line: u32,
    emitter: Emitter,
    loops: Vec<LoopCtx>,
    consts: HashSet<String>,
    in_function: bool,
    temp_counter: u32,
}

/// Compile OakScript source straight to a `(code, data)` pair, ready for
/// `crate::container::write`.
pub fn compile(source: &str) -> Result<(Vec<u8>, Vec<u8>), CompileError> {
    let mut parser = Parser::new(source)?;
    parser.parse_program()
}

impl Parser {
    fn new(source: &str) -> Result<Self, CompileError> {
        let mut includer = Includer::new(source);
        let first = includer.next_token()?;
        Ok(Parser {
            includer,
            cur: first.token,
            cur_line: first.line,
            emitter: Emitter::new(),
            loops: Vec::new(),
            consts: HashSet::new(),
            in_function: false,
            temp_counter: 0,
        })
    }

    fn line(&self) -> u32 {
        self.cur_line
    }

    fn bump(&mut self) -> Result<Token, CompileError> {
        let spanned = self.includer.next_token()?;
        let old = std::mem::replace(&mut self.cur, spanned.token);
        self.cur_line = spanned.line;
        Ok(old)
    }

    fn at_eof(&self) -> bool {
        self.cur == Token::Eof
    }

    fn at_keyword(&self, k: Keyword) -> bool {
        self.cur == Token::Keyword(k)
    }

    fn at_punct(&self, p: Punct) -> bool {
        self.cur == Token::Punct(p)
    }

    fn skip_newlines(&mut self) -> Result<(), CompileError> {
        while self.cur == Token::Newline {
            self.bump()?;
        }
        Ok(())
    }

    fn expect_punct(&mut self, p: Punct) -> Result<(), CompileError> {
        if self.at_punct(p) {
            self.bump()?;
            Ok(())
        } else {
            Err(ParseError::Expected {
                line: self.line(),
                expected: format!("{p:?}"),
                found: format!("{:?}", self.cur),
            }
            .into())
        }
    }

    fn expect_keyword(&mut self, k: Keyword) -> Result<(), CompileError> {
        if self.at_keyword(k) {
            self.bump()?;
            Ok(())
        } else {
            Err(ParseError::Expected {
                line: self.line(),
                expected: format!("{k:?}"),
                found: format!("{:?}", self.cur),
            }
            .into())
        }
    }

    /// Consume `k` if present; a no-op otherwise. Used for keywords the
    /// grammar marks optional (`do?` in `while`/`for` headers).
    fn skip_keyword(&mut self, k: Keyword) -> Result<(), CompileError> {
        if self.at_keyword(k) {
            self.bump()?;
        }
        Ok(())
    }

    fn expect_identifier(&mut self) -> Result<String, CompileError> {
        match self.bump()? {
            Token::Identifier(name) => Ok(name),
            other => Err(ParseError::Expected {
                line: self.line(),
                expected: "identifier".to_string(),
                found: format!("{other:?}"),
            }
            .into()),
        }
    }

    fn next_temp(&mut self, prefix: &str) -> String {
        self.temp_counter += 1;
        format!("__{prefix}{}", self.temp_counter)
    }

    // ---- program & statements -------------------------------------------

    fn parse_program(mut self) -> Result<(Vec<u8>, Vec<u8>), CompileError> {
        self.skip_newlines()?;
        while !self.at_eof() {
            self.statement()?;
            self.skip_newlines()?;
        }
        self.emitter.emit(Op::Halt);
        let line = self.line();
        self.emitter.finish(line).map_err(Into::into)
    }

    /// Parse statements until the current token is one of `stops` (or EOF,
    /// which is always an error here — every block is opened by a keyword
    /// that promises a matching terminator).
    fn block_until(&mut self, stops: &[Keyword]) -> Result<(), CompileError> {
        self.skip_newlines()?;
        loop {
            if self.at_eof() {
                return Err(ParseError::UnexpectedToken {
                    line: self.line(),
                    found: "end of file".to_string(),
                }
                .into());
            }
            if let Token::Keyword(k) = &self.cur {
                if stops.contains(k) {
                    return Ok(());
                }
            }
            self.statement()?;
            self.skip_newlines()?;
        }
    }

    fn statement(&mut self) -> Result<(), CompileError> {
        let line = self.line();
        self.emitter.emit_line(line);
        match &self.cur {
            Token::Keyword(Keyword::If) => self.if_stmt(),
            Token::Keyword(Keyword::While) => self.while_stmt(),
            Token::Keyword(Keyword::For) => self.for_stmt(),
            Token::Keyword(Keyword::Switch) => self.switch_stmt(),
            Token::Keyword(Keyword::Function) => self.function_stmt(),
            Token::Keyword(Keyword::Return) => self.return_stmt(line),
            Token::Keyword(Keyword::Break) => self.break_stmt(line),
            Token::Keyword(Keyword::Continue) => self.continue_stmt(line),
            Token::Keyword(Keyword::Try) => self.try_stmt(),
            Token::Keyword(Keyword::Throw) => self.throw_stmt(),
            Token::Keyword(Keyword::Print) => self.print_stmt(),
            Token::Keyword(Keyword::Const) => self.const_stmt(),
            Token::Identifier(_) => self.expr_or_assign_stmt(line),
            other => Err(ParseError::UnexpectedToken {
                line,
                found: format!("{other:?}"),
            }
            .into()),
        }
    }

    fn store_checked(&mut self, name: &str, line: u32) -> Result<(), CompileError> {
        if self.consts.contains(name) {
            return Err(EmitError::ConstReassign {
                line,
                name: name.to_string(),
            }
            .into());
        }
        self.emitter.emit_store(name);
        Ok(())
    }

    fn expr_or_assign_stmt(&mut self, line: u32) -> Result<(), CompileError> {
        let name = self.expect_identifier()?;
        match self.cur.clone() {
            Token::Punct(Punct::Assign) => {
                self.bump()?;
                self.expression()?;
                self.store_checked(&name, line)?;
            }
            Token::Punct(p @ (Punct::PlusEq | Punct::MinusEq | Punct::StarEq | Punct::SlashEq)) => {
                self.bump()?;
                self.emitter.emit_load(&name);
                self.expression()?;
                self.emitter.emit(match p {
                    Punct::PlusEq => Op::Add,
                    Punct::MinusEq => Op::Sub,
                    Punct::StarEq => Op::Mul,
                    Punct::SlashEq => Op::Div,
                    _ => unreachable!(),
                });
                self.store_checked(&name, line)?;
            }
            Token::Punct(p @ (Punct::PlusPlus | Punct::MinusMinus)) => {
                self.bump()?;
                self.emitter.emit_load(&name);
                self.emitter.emit_push_int(1);
                self.emitter
                    .emit(if p == Punct::PlusPlus { Op::Add } else { Op::Sub });
                self.store_checked(&name, line)?;
            }
            Token::Punct(Punct::LParen) => {
                self.call_or_load(name)?;
                self.emitter.emit(Op::Pop);
            }
            _ => {
                // A bare name used as a statement: load and discard.
                self.emitter.emit_load(&name);
                self.emitter.emit(Op::Pop);
            }
        }
        Ok(())
    }

    fn const_stmt(&mut self) -> Result<(), CompileError> {
        let line = self.line();
        self.bump()?; // 'const'
        let name = self.expect_identifier()?;
        if self.consts.contains(&name) {
            return Err(EmitError::ConstReassign { line, name }.into());
        }
        self.expect_punct(Punct::Assign)?;
        self.expression()?;
        self.emitter.emit_store_const(&name);
        self.consts.insert(name);
        Ok(())
    }

    fn print_stmt(&mut self) -> Result<(), CompileError> {
        self.bump()?; // 'print'
        self.expression()?;
        self.emitter.emit(Op::Print);
        Ok(())
    }

    fn throw_stmt(&mut self) -> Result<(), CompileError> {
        self.bump()?; // 'throw'
        self.expression()?;
        self.emitter.emit(Op::Throw);
        Ok(())
    }

    fn break_stmt(&mut self, line: u32) -> Result<(), CompileError> {
        self.bump()?;
        let label = self
            .loops
            .last()
            .map(|l| l.break_label)
            .ok_or(EmitError::BreakOutsideLoop { line })?;
        self.emitter.emit_jump(Op::Jump, label);
        Ok(())
    }

    fn continue_stmt(&mut self, line: u32) -> Result<(), CompileError> {
        self.bump()?;
        let label = self
            .loops
            .last()
            .map(|l| l.continue_label)
            .ok_or(EmitError::ContinueOutsideLoop { line })?;
        self.emitter.emit_jump(Op::Jump, label);
        Ok(())
    }

    fn return_stmt(&mut self, line: u32) -> Result<(), CompileError> {
        if !self.in_function {
            return Err(EmitError::ReturnOutsideFunction { line }.into());
        }
        self.bump()?; // 'return'
        if self.cur == Token::Newline || self.at_eof() {
            self.emitter.emit_push_nil();
        } else {
            self.expression()?;
        }
        self.emitter.emit_return();
        Ok(())
    }

    // ---- control flow ----------------------------------------------------

    fn if_stmt(&mut self) -> Result<(), CompileError> {
        self.bump()?; // 'if'
        self.expression()?;
        self.expect_keyword(Keyword::Then)?;
        let else_label = self.emitter.new_label();
        let end_label = self.emitter.new_label();
        self.emitter.emit_jump(Op::JumpIfFalse, else_label);
        self.block_until(&[Keyword::Else, Keyword::End])?;
        if self.at_keyword(Keyword::Else) {
            self.emitter.emit_jump(Op::Jump, end_label);
            self.emitter.bind_label(else_label);
            self.bump()?; // 'else'
            self.block_until(&[Keyword::End])?;
            self.expect_keyword(Keyword::End)?;
            self.emitter.bind_label(end_label);
        } else {
            self.expect_keyword(Keyword::End)?;
            self.emitter.bind_label(else_label);
        }
        Ok(())
    }

    fn while_stmt(&mut self) -> Result<(), CompileError> {
        self.bump()?; // 'while'
        let top = self.emitter.new_label();
        let end = self.emitter.new_label();
        self.emitter.bind_label(top);
        self.expression()?;
        self.skip_keyword(Keyword::Do)?;
        self.emitter.emit_jump(Op::JumpIfFalse, end);
        self.loops.push(LoopCtx {
            break_label: end,
            continue_label: top,
        });
        self.block_until(&[Keyword::End])?;
        self.loops.pop();
        self.emitter.emit_jump(Op::Jump, top);
        self.expect_keyword(Keyword::End)?;
        self.emitter.bind_label(end);
        Ok(())
    }

    /// `for i = a to b [step s] do ... end` and, by desugaring the range
    /// literal, `for i in a..b do ... end`. Per the pinned decision on
    /// iteration (see DESIGN.md), `for ... in` accepts only a range literal,
    /// never an arbitrary collection expression.
    fn for_stmt(&mut self) -> Result<(), CompileError> {
        self.bump()?; // 'for'
        let var = self.expect_identifier()?;

        let end_is_exclusive;
        if self.at_punct(Punct::Assign) {
            self.bump()?;
            self.expression()?; // start value
            self.expect_keyword(Keyword::To)?;
            end_is_exclusive = false;
        } else {
            self.expect_keyword(Keyword::In)?;
            self.expression()?; // range start
            self.expect_punct(Punct::DotDot)?;
            end_is_exclusive = true;
        }

        self.emitter.emit_store(&var);

        let bound_name = self.next_temp("for_b");
        self.expression()?; // end value
        if end_is_exclusive {
            self.emitter.emit_push_int(1);
            self.emitter.emit(Op::Sub);
        }
        self.emitter.emit_store(&bound_name);

        let step_name = self.next_temp("for_s");
        if !end_is_exclusive && self.at_keyword(Keyword::Step) {
            self.bump()?;
            self.expression()?;
        } else {
            self.emitter.emit_push_int(1);
        }
        self.emitter.emit_store(&step_name);

        self.skip_keyword(Keyword::Do)?;

        let top = self.emitter.new_label();
        let end = self.emitter.new_label();
        let neg_branch = self.emitter.new_label();
        let cond_join = self.emitter.new_label();

        self.emitter.bind_label(top);
        // condition: (step >= 0) ? (var <= bound) : (var >= bound)
        self.emitter.emit_load(&step_name);
        self.emitter.emit_push_int(0);
        self.emitter.emit(Op::Ge);
        self.emitter.emit_jump(Op::JumpIfFalse, neg_branch);
        self.emitter.emit_load(&var);
        self.emitter.emit_load(&bound_name);
        self.emitter.emit(Op::Le);
        self.emitter.emit_jump(Op::Jump, cond_join);
        self.emitter.bind_label(neg_branch);
        self.emitter.emit_load(&var);
        self.emitter.emit_load(&bound_name);
        self.emitter.emit(Op::Ge);
        self.emitter.bind_label(cond_join);
        self.emitter.emit_jump(Op::JumpIfFalse, end);

        let continue_label = self.emitter.new_label();
        self.loops.push(LoopCtx {
            break_label: end,
            continue_label,
        });
        self.block_until(&[Keyword::End])?;
        self.loops.pop();

        self.emitter.bind_label(continue_label);
        self.emitter.emit_load(&var);
        self.emitter.emit_load(&step_name);
        self.emitter.emit(Op::Add);
        self.emitter.emit_store(&var);
        self.emitter.emit_jump(Op::Jump, top);

        self.expect_keyword(Keyword::End)?;
        self.emitter.bind_label(end);
        Ok(())
    }

    fn switch_stmt(&mut self) -> Result<(), CompileError> {
        self.bump()?; // 'switch'
        self.expression()?;
        let scrutinee = self.next_temp("switch");
        self.emitter.emit_store(&scrutinee);
        self.skip_newlines()?;

        let end = self.emitter.new_label();
        loop {
            if self.at_keyword(Keyword::Case) {
                self.bump()?;
                self.expression()?;
                self.emitter.emit_load(&scrutinee);
                // stack: [case_value]  then load scrutinee -> [case_value, scrutinee]
                // Eq pops both; order doesn't matter for equality.
                self.emitter.emit(Op::Eq);
                let next_case = self.emitter.new_label();
                self.emitter.emit_jump(Op::JumpIfFalse, next_case);
                self.block_until(&[Keyword::Case, Keyword::Default, Keyword::End])?;
                self.emitter.emit_jump(Op::Jump, end);
                self.emitter.bind_label(next_case);
            } else if self.at_keyword(Keyword::Default) {
                self.bump()?;
                self.block_until(&[Keyword::End])?;
                break;
            } else {
                break;
            }
        }
        self.expect_keyword(Keyword::End)?;
        self.emitter.bind_label(end);
        Ok(())
    }

    fn function_stmt(&mut self) -> Result<(), CompileError> {
        let line = self.line();
        self.bump()?; // 'function'
        let name = self.expect_identifier()?;
        self.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        if !self.at_punct(Punct::RParen) {
            loop {
                params.push(self.expect_identifier()?);
                if self.at_punct(Punct::Comma) {
                    self.bump()?;
                    continue;
                }
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;

        let skip = self.emitter.new_label();
        self.emitter.emit_jump(Op::Jump, skip);
        let entry = self.emitter.declare_function(&name, params.len(), line)?;
        self.emitter.bind_label(entry);
        for p in params.iter().rev() {
            self.emitter.emit_store(p);
        }

        let was_in_function = std::mem::replace(&mut self.in_function, true);
        self.block_until(&[Keyword::End])?;
        self.in_function = was_in_function;
        self.expect_keyword(Keyword::End)?;

        // Implicit `return nil` if the body falls through.
        self.emitter.emit_push_nil();
        self.emitter.emit_return();
        self.emitter.bind_label(skip);
        Ok(())
    }

    /// `try ... catch [name] ... [finally ...] end`.
    ///
    /// Lowers to two layered handlers, since `finally` is the trickiest
    /// corner: an inner one for the user's `catch`, and an
    /// outer one that stays registered through the catch block too, so an
    /// error raised inside `catch` also runs `finally` before propagating.
    ///
    /// The `finally` statements themselves are only ever emitted once
    /// (there's no AST to duplicate them from); both the normal/caught exit
    /// and the unwind-through-outer-handler exit jump into that single copy,
    /// landing with a hidden flag set that tells it whether to fall through
    /// afterward or rethrow the in-flight exception.
    fn try_stmt(&mut self) -> Result<(), CompileError> {
        self.bump()?; // 'try'
        let catch_label = self.emitter.new_label();
        let outer_finally = self.emitter.new_label();
        let run_finally = self.emitter.new_label();
        let after_finally = self.emitter.new_label();
        let end = self.emitter.new_label();
        let rethrow_flag = self.next_temp("try_rethrow");
        let exc_slot = self.next_temp("try_exc");

        self.emitter.emit_push_handler(outer_finally);
        self.emitter.emit_push_handler(catch_label);
        self.block_until(&[Keyword::Catch])?;
        self.emitter.emit(Op::PopHandler); // pop catch handler
        self.emitter.emit(Op::PopHandler); // pop outer finally handler
        self.emitter.emit_push_bool(false);
        self.emitter.emit_store(&rethrow_flag);
        self.emitter.emit_jump(Op::Jump, run_finally);

        self.expect_keyword(Keyword::Catch)?;
        self.emitter.bind_label(catch_label);
        if let Token::Identifier(name) = self.cur.clone() {
            self.bump()?;
            self.emitter.emit_store(&name);
        } else {
            self.emitter.emit(Op::Pop);
        }
        self.block_until(&[Keyword::Finally, Keyword::End])?;
        self.emitter.emit(Op::PopHandler); // pop outer finally handler
        self.emitter.emit_push_bool(false);
        self.emitter.emit_store(&rethrow_flag);
        self.emitter.emit_jump(Op::Jump, run_finally);

        // Reached only via an unwind: the try body or the catch body threw
        // with no active inner handler. The thrown value is on top of the
        // operand stack; stash it, mark the rethrow flag, and fall into the
        // shared finally body below.
        self.emitter.bind_label(outer_finally);
        self.emitter.emit_store(&exc_slot);
        self.emitter.emit_push_bool(true);
        self.emitter.emit_store(&rethrow_flag);

        self.emitter.bind_label(run_finally);
        if self.at_keyword(Keyword::Finally) {
            self.bump()?;
            self.block_until(&[Keyword::End])?;
        }
        self.emitter.emit_load(&rethrow_flag);
        self.emitter.emit_jump(Op::JumpIfFalse, after_finally);
        self.emitter.emit_load(&exc_slot);
        self.emitter.emit(Op::Throw);
        self.emitter.bind_label(after_finally);
        self.emitter.emit_jump(Op::Jump, end);

        self.expect_keyword(Keyword::End)?;
        self.emitter.bind_label(end);
        Ok(())
    }

    // ---- calls -------------------------------------------------------

    fn call_or_load(&mut self, name: String) -> Result<(), CompileError> {
        if self.at_punct(Punct::LParen) {
            self.bump()?;
            let mut argc: u8 = 0;
            if !self.at_punct(Punct::RParen) {
                loop {
                    self.expression()?;
                    argc += 1;
                    if self.at_punct(Punct::Comma) {
                        self.bump()?;
                        continue;
                    }
                    break;
                }
            }
            self.expect_punct(Punct::RParen)?;
            if let Some(id) = builtins::id_for_name(&name) {
                self.emitter.emit_call_builtin(id, argc);
            } else {
                let label = self.emitter.reference_function(&name);
                self.emitter.emit_call_user(label, argc);
            }
        } else {
            self.emitter.emit_load(&name);
        }
        Ok(())
    }

    // ---- expressions: ternary > or > and > not > eq > rel > add > mul > unary > postfix > primary

    fn expression(&mut self) -> Result<(), CompileError> {
        self.ternary()
    }

    fn ternary(&mut self) -> Result<(), CompileError> {
        self.logical_or()?;
        if self.at_punct(Punct::Question) {
            self.bump()?;
            let else_label = self.emitter.new_label();
            let end_label = self.emitter.new_label();
            self.emitter.emit_jump(Op::JumpIfFalse, else_label);
            self.expression()?;
            self.emitter.emit_jump(Op::Jump, end_label);
            self.expect_punct(Punct::Colon)?;
            self.emitter.bind_label(else_label);
            self.expression()?;
            self.emitter.bind_label(end_label);
        }
        Ok(())
    }

    fn logical_or(&mut self) -> Result<(), CompileError> {
        self.logical_and()?;
        while self.at_keyword(Keyword::Or) {
            self.bump()?;
            let end = self.emitter.new_label();
            self.emitter.emit(Op::Dup);
            self.emitter.emit_jump(Op::JumpIfTrue, end);
            self.emitter.emit(Op::Pop);
            self.logical_and()?;
            self.emitter.bind_label(end);
        }
        Ok(())
    }

    fn logical_and(&mut self) -> Result<(), CompileError> {
        self.unary_not()?;
        while self.at_keyword(Keyword::And) {
            self.bump()?;
            let end = self.emitter.new_label();
            self.emitter.emit(Op::Dup);
            self.emitter.emit_jump(Op::JumpIfFalse, end);
            self.emitter.emit(Op::Pop);
            self.unary_not()?;
            self.emitter.bind_label(end);
        }
        Ok(())
    }

    fn unary_not(&mut self) -> Result<(), CompileError> {
        if self.at_keyword(Keyword::Not) {
            self.bump()?;
            self.unary_not()?;
            self.emitter.emit(Op::Not);
            Ok(())
        } else {
            self.equality()
        }
    }

    fn equality(&mut self) -> Result<(), CompileError> {
        self.relational()?;
        loop {
            let op = match &self.cur {
                Token::Punct(Punct::Eq) => Op::Eq,
                Token::Punct(Punct::Ne) => Op::Ne,
                _ => break,
            };
            self.bump()?;
            self.relational()?;
            self.emitter.emit(op);
        }
        Ok(())
    }

    fn relational(&mut self) -> Result<(), CompileError> {
        self.additive()?;
        loop {
            let op = match &self.cur {
                Token::Punct(Punct::Lt) => Op::Lt,
                Token::Punct(Punct::Le) => Op::Le,
                Token::Punct(Punct::Gt) => Op::Gt,
                Token::Punct(Punct::Ge) => Op::Ge,
                _ => break,
            };
            self.bump()?;
            self.additive()?;
            self.emitter.emit(op);
        }
        Ok(())
    }

    fn additive(&mut self) -> Result<(), CompileError> {
        self.multiplicative()?;
        loop {
            let op = match &self.cur {
                Token::Punct(Punct::Plus) => Op::Add,
                Token::Punct(Punct::Minus) => Op::Sub,
                _ => break,
            };
            self.bump()?;
            self.multiplicative()?;
            self.emitter.emit(op);
        }
        Ok(())
    }

    fn multiplicative(&mut self) -> Result<(), CompileError> {
        self.unary()?;
        loop {
            let op = match &self.cur {
                Token::Punct(Punct::Star) => Op::Mul,
                Token::Punct(Punct::Slash) => Op::Div,
                Token::Punct(Punct::Percent) => Op::Mod,
                _ => break,
            };
            self.bump()?;
            self.unary()?;
            self.emitter.emit(op);
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<(), CompileError> {
        if self.at_punct(Punct::Minus) {
            self.bump()?;
            self.unary()?;
            self.emitter.emit(Op::Neg);
            Ok(())
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<(), CompileError> {
        let line = self.line();
        match self.bump()? {
            Token::Int(v) => {
                self.emitter.emit_push_int(v);
                Ok(())
            }
            Token::Float(v) => {
                self.emitter.emit_push_float(v);
                Ok(())
            }
            Token::Str(s) => {
                self.emitter.emit_push_str(&s);
                Ok(())
            }
            Token::Keyword(Keyword::True) => {
                self.emitter.emit_push_bool(true);
                Ok(())
            }
            Token::Keyword(Keyword::False) => {
                self.emitter.emit_push_bool(false);
                Ok(())
            }
            Token::Punct(Punct::LParen) => {
                self.expression()?;
                self.expect_punct(Punct::RParen)
            }
            Token::Identifier(name) => self.call_or_load(name),
            other => Err(ParseError::UnexpectedToken {
                line,
                found: format!("{other:?}"),
            }
            .into()),
        }
    }
}
