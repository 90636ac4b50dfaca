//! Tree-walking interpreter.
//!
//! Executes a parsed [`Program`] against a [`Realm`]. Variables live in scope
//! objects on the heap; the scope chain is the prototype chain of those
//! objects and ends at the global object.
//!
//! Collections happen at statement boundaries, at any call depth. Every
//! value a Rust frame holds across a nested evaluation is pushed on the
//! `pending` stack first, so the current scope, the completion value and
//! `pending` are the only roots the interpreter contributes.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::arena::Reserve;
use crate::ast::*;
use crate::error::{ErrorKind, Exception, JsResult};
use crate::heap::{Class, PROP_CONST};
use crate::realm::{Host, Intrinsic, Name, Realm};
use crate::render::NO_STRING;
use crate::value::{to_int32, to_uint32, ObjRef, StrRef, Value};

/// Stmt completion.
enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Assignment target.
enum Place {
    Var(Atom),
    Property(Value, StrRef),
}

/// Interpreter state for one evaluation.
pub(crate) struct Interpreter<'r, 'a> {
    realm: &'r mut Realm<'a>,
    host: &'r mut dyn Host,
    /// Code of the running function.
    program: Rc<Program>,
    /// Realm slot of `program`.
    slot: usize,
    /// Innermost scope.
    env: ObjRef,
    /// Function call depth.
    depth: usize,
    /// Value of the last top-level expression statement.
    completion: Value,
    /// Values Rust frames hold across nested evaluation: operands, callees,
    /// saved scopes and exceptions saved by `finally`.
    pending: Vec<Value>,
}

impl<'r, 'a> Interpreter<'r, 'a> {
    pub(crate) fn new(
        realm: &'r mut Realm<'a>,
        host: &'r mut dyn Host,
        slot: usize,
        program: Rc<Program>,
    ) -> Self {
        let env = realm.global;
        Interpreter {
            realm,
            host,
            program,
            slot,
            env,
            depth: 0,
            completion: Value::Undefined,
            pending: Vec::new(),
        }
    }

    /// Run the program's top-level code.
    pub(crate) fn run_program(mut self) -> JsResult<Value> {
        let program = self.program.clone();
        self.hoist_vars(&program.var_names)?;
        self.exec_statements(&program.body)?;
        Ok(self.completion)
    }

    // Helpers

    fn atom(&self, atom: Atom) -> StrRef {
        self.realm
            .programs
            .get(self.slot)
            .and_then(Option::as_ref)
            .and_then(|p| p.atoms.get(atom as usize).copied())
            .unwrap_or(NO_STRING)
    }

    fn throw_error(&mut self, kind: ErrorKind, message: &str) -> Exception {
        self.realm.throw_error(kind, message)
    }

    fn new_object(&mut self, class: Class, proto: Option<ObjRef>, data: [u32; 3]) -> JsResult<ObjRef> {
        match self.realm.heap.new_object(class, proto, data, Reserve::Normal) {
            Ok(o) => Ok(o),
            Err(_) => Err(self.realm.throw_out_of_memory()),
        }
    }

    fn new_scope(&mut self, function: bool) -> JsResult<ObjRef> {
        let parent = self.env;
        self.new_object(Class::Scope, Some(parent), [function as u32, 0, 0])
    }

    /// Create or overwrite an own property.
    fn define(&mut self, object: ObjRef, key: StrRef, value: Value, flags: u32) -> JsResult<()> {
        match self.realm.heap.set_property(object, key, value, flags, Reserve::Normal) {
            Ok(_) => Ok(()),
            Err(_) => Err(self.realm.throw_out_of_memory()),
        }
    }

    fn has_own(&self, object: ObjRef, atom: Atom) -> bool {
        self.realm
            .heap
            .view()
            .find_own(object, self.program.atom(atom).as_bytes())
            .is_some()
    }

    /// Run `f` with `values` rooted for any collection it reaches.
    fn with_roots<T>(
        &mut self,
        values: &[Value],
        f: impl FnOnce(&mut Self) -> JsResult<T>,
    ) -> JsResult<T> {
        let mark = self.pending.len();
        self.pending.extend_from_slice(values);
        let result = f(self);
        self.pending.truncate(mark);
        result
    }

    /// Collect garbage if due.
    fn safe_point(&mut self) {
        let base = self.pending.len();
        self.pending.push(Value::Object(self.env));
        self.pending.push(self.completion);
        self.realm.maybe_collect(&self.pending);
        self.pending.truncate(base);
    }

    // Declarations

    fn hoist_vars(&mut self, names: &[Atom]) -> JsResult<()> {
        for &name in names {
            if !self.has_own(self.env, name) {
                let key = self.atom(name);
                self.define(self.env, key, Value::Undefined, 0)?;
            }
        }
        Ok(())
    }

    fn hoist_functions(&mut self, statements: &[Stmt]) -> JsResult<()> {
        for statement in statements {
            if let Stmt::Function(id) = statement {
                let name = self.program.functions.get(*id as usize).and_then(|f| f.name);
                if let Some(name) = name {
                    let closure = self.make_closure(*id)?;
                    let key = self.atom(name);
                    self.define(self.env, key, closure, 0)?;
                }
            }
        }
        Ok(())
    }

    fn make_closure(&mut self, id: FuncId) -> JsResult<Value> {
        let data = [self.slot as u32, id, self.env.0];
        self.new_object(Class::Closure, None, data).map(Value::Function)
    }

    // Variables

    fn get_var(&mut self, name: Atom) -> JsResult<Value> {
        let view = self.realm.heap.view();
        match view.lookup(self.env, self.program.atom(name).as_bytes()) {
            Some((_, p)) => Ok(view.prop_value(p)),
            None => {
                let message = format!("{} is not defined", self.program.atom(name));
                Err(self.throw_error(ErrorKind::ReferenceError, &message))
            }
        }
    }

    fn assign_var(&mut self, name: Atom, value: Value) -> JsResult<()> {
        let view = self.realm.heap.view();
        match view.lookup(self.env, self.program.atom(name).as_bytes()) {
            Some((_, p)) => {
                if view.prop_flags(p) & PROP_CONST != 0 {
                    return Err(self.throw_error(ErrorKind::TypeError, "Assignment to constant variable."));
                }
                self.realm.heap.write_prop(p, value);
                Ok(())
            }
            None => {
                // Sloppy mode: assignment creates a global.
                let key = self.atom(name);
                self.define(self.realm.global, key, value, 0)
            }
        }
    }

    fn this_value(&self) -> Value {
        let view = self.realm.heap.view();
        let key = view.string_bytes(self.realm.name(Name::This));
        match view.get(self.env, key) {
            Some(value) => value,
            None => Value::Object(self.realm.global),
        }
    }

    // Statements

    fn exec_statements(&mut self, statements: &[Stmt]) -> JsResult<Completion> {
        self.hoist_functions(statements)?;
        for statement in statements {
            match self.exec_statement(statement)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_statement(&mut self, statement: &Stmt) -> JsResult<Completion> {
        self.safe_point();
        match statement {
            Stmt::Empty | Stmt::Function(_) => Ok(Completion::Normal),
            Stmt::Expr(expr) => {
                let value = self.eval(expr)?;
                if self.depth == 0 {
                    self.completion = value;
                }
                Ok(Completion::Normal)
            }
            Stmt::Block(block) => self.exec_block(block),
            Stmt::Var(decl) => {
                self.exec_variable(decl)?;
                Ok(Completion::Normal)
            }
            Stmt::If(stmt) => {
                let test = self.eval(&stmt.cond)?;
                if self.realm.truthy(test) {
                    self.exec_statement(&stmt.then)
                } else if let Some(otherwise) = &stmt.otherwise {
                    self.exec_statement(otherwise)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::For(stmt) => self.exec_for(stmt),
            Stmt::While(stmt) => {
                loop {
                    let test = self.eval(&stmt.cond)?;
                    if !self.realm.truthy(test) {
                        break;
                    }
                    match self.exec_statement(&stmt.body)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile(stmt) => {
                loop {
                    match self.exec_statement(&stmt.body)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    let test = self.eval(&stmt.cond)?;
                    if !self.realm.truthy(test) {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Break => Ok(Completion::Break),
            Stmt::Continue => Ok(Completion::Continue),
            Stmt::Return(argument) => {
                let value = match argument {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr)?;
                Err(self.realm.throw(value))
            }
            Stmt::Try(stmt) => self.exec_try(stmt),
        }
    }

    fn exec_block(&mut self, block: &Block) -> JsResult<Completion> {
        if !block.lexical {
            return self.exec_statements(&block.body);
        }
        let scope = self.new_scope(false)?;
        let saved = core::mem::replace(&mut self.env, scope);
        let result = self.exec_statements(&block.body);
        self.env = saved;
        result
    }

    fn exec_variable(&mut self, decl: &VarDecl) -> JsResult<()> {
        for declarator in &decl.declarators {
            match decl.kind {
                DeclKind::Var => {
                    if let Some(init) = &declarator.init {
                        let value = self.eval(init)?;
                        self.assign_var(declarator.name, value)?;
                    }
                }
                DeclKind::Let | DeclKind::Const => {
                    let value = match &declarator.init {
                        Some(init) => self.eval(init)?,
                        None => Value::Undefined,
                    };
                    let flags = if decl.kind == DeclKind::Const { PROP_CONST } else { 0 };
                    let key = self.atom(declarator.name);
                    self.define(self.env, key, value, flags)?;
                }
            }
        }
        Ok(())
    }

    fn exec_for(&mut self, stmt: &ForStmt) -> JsResult<Completion> {
        let lexical = matches!(&stmt.init, Some(ForInit::Var(d)) if d.kind != DeclKind::Var);
        if !lexical {
            return self.run_for(stmt);
        }
        let scope = self.new_scope(false)?;
        let saved = core::mem::replace(&mut self.env, scope);
        let result = self.run_for(stmt);
        self.env = saved;
        result
    }

    fn run_for(&mut self, stmt: &ForStmt) -> JsResult<Completion> {
        match &stmt.init {
            Some(ForInit::Var(decl)) => self.exec_variable(decl)?,
            Some(ForInit::Expr(expr)) => {
                self.eval(expr)?;
            }
            None => {}
        }

        loop {
            if let Some(test) = &stmt.cond {
                let value = self.eval(test)?;
                if !self.realm.truthy(value) {
                    break;
                }
            }
            match self.exec_statement(&stmt.body)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
            if let Some(update) = &stmt.update {
                self.eval(update)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_try(&mut self, stmt: &TryStmt) -> JsResult<Completion> {
        let mut result = self.exec_block(&stmt.block);

        if let Some(catch_clause) = &stmt.catch_clause {
            if result.is_err() {
                let thrown = self.realm.take_exception().unwrap_or_default();
                result = self.exec_catch(catch_clause, thrown);
            }
        }

        if let Some(finally_block) = &stmt.finally_block {
            let thrown = if result.is_err() { self.realm.take_exception() } else { None };
            let base = self.pending.len();
            if let Some(value) = thrown {
                self.pending.push(value);
            }
            if let Ok(Completion::Return(value)) = &result {
                self.pending.push(*value);
            }
            let outcome = self.exec_block(finally_block);
            self.pending.truncate(base);

            match outcome {
                Ok(Completion::Normal) => {
                    if let Some(value) = thrown {
                        return Err(self.realm.throw(value));
                    }
                }
                other => return other,
            }
        }

        result
    }

    fn exec_catch(&mut self, catch_clause: &CatchClause, thrown: Value) -> JsResult<Completion> {
        let scope = self.new_scope(false)?;
        let saved = core::mem::replace(&mut self.env, scope);
        let mut result = Ok(Completion::Normal);
        if let Some(param) = catch_clause.param {
            let key = self.atom(param);
            result = self.define(scope, key, thrown, 0).map(|_| Completion::Normal);
        }
        if result.is_ok() {
            result = self.exec_block(&catch_clause.body);
        }
        self.env = saved;
        result
    }

    // Expressions

    fn eval(&mut self, expr: &Expr) -> JsResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::number(*n)),
            Expr::String(atom) => Ok(Value::String(self.atom(*atom))),
            Expr::Boolean(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Identifier(name) => self.get_var(*name),
            Expr::This => Ok(self.this_value()),
            Expr::Object(properties) => self.eval_object(properties),
            Expr::Function(id) => self.make_closure(*id),
            Expr::Member(member) => {
                let object = self.eval(&member.object)?;
                let key = self.with_roots(&[object], |interp| interp.property_key(&member.property))?;
                self.get_property(object, key)
            }
            Expr::Call(call) => self.eval_call(call),
            Expr::New(call) => self.eval_new(call),
            Expr::Unary(unary) => self.eval_unary(unary),
            Expr::Update(update) => self.eval_update(update),
            Expr::Binary(binary) => {
                let left = self.eval(&binary.left)?;
                let right = self.with_roots(&[left], |interp| interp.eval(&binary.right))?;
                self.binary(binary.operator, left, right)
            }
            Expr::Logical(logical) => {
                let left = self.eval(&logical.left)?;
                let short_circuit = match logical.operator {
                    LogicalOp::And => !self.realm.truthy(left),
                    LogicalOp::Or => self.realm.truthy(left),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(&logical.right)
                }
            }
            Expr::Conditional(cond) => {
                let test = self.eval(&cond.cond)?;
                if self.realm.truthy(test) {
                    self.eval(&cond.then)
                } else {
                    self.eval(&cond.otherwise)
                }
            }
            Expr::Assignment(assign) => self.eval_assignment(assign),
            Expr::Sequence(list) => {
                let mut last = Value::Undefined;
                for expr in list {
                    last = self.eval(expr)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_object(&mut self, properties: &[ObjectProperty]) -> JsResult<Value> {
        let object = self.new_object(Class::Plain, None, [0; 3])?;
        self.with_roots(&[Value::Object(object)], |interp| {
            for property in properties {
                let key = interp.property_key(&property.key)?;
                let value = interp.with_roots(&[Value::String(key)], |interp| interp.eval(&property.value))?;
                interp.define(object, key, value, 0)?;
            }
            Ok(Value::Object(object))
        })
    }

    fn property_key(&mut self, name: &PropertyName) -> JsResult<StrRef> {
        match name {
            PropertyName::Named(atom) => Ok(self.atom(*atom)),
            PropertyName::Computed(expr) => {
                let value = self.eval(expr)?;
                self.realm.render_to_string(value)
            }
        }
    }

    fn get_property(&mut self, object: Value, key: StrRef) -> JsResult<Value> {
        let view = self.realm.heap.view();
        let key_bytes = view.string_bytes(key);
        match object {
            Value::Function(f) if key_bytes == b"prototype" && view.class(f) == Some(Class::Closure) => {
                if self.is_arrow(f) {
                    return Ok(Value::Undefined);
                }
                self.prototype_of(f).map(Value::Object)
            }
            Value::Object(o) | Value::Function(o) => Ok(view.get(o, key_bytes).unwrap_or_default()),
            Value::String(s) if key_bytes == b"length" => {
                let bytes = view.string_bytes(s);
                let units = match core::str::from_utf8(bytes) {
                    Ok(text) => text.encode_utf16().count(),
                    Err(_) => bytes.len(),
                };
                Ok(Value::number(units as f64))
            }
            Value::Undefined | Value::Null => {
                let message = format!(
                    "Cannot read properties of {} (reading '{}')",
                    if object.is_undefined() { "undefined" } else { "null" },
                    String::from_utf8_lossy(key_bytes)
                );
                Err(self.throw_error(ErrorKind::TypeError, &message))
            }
            _ => Ok(Value::Undefined),
        }
    }

    fn set_property(&mut self, object: Value, key: StrRef, value: Value) -> JsResult<()> {
        match object {
            Value::Object(o) | Value::Function(o) => {
                let view = self.realm.heap.view();
                if let Some(p) = view.find_own(o, view.string_bytes(key)) {
                    // Read-only globals ignore writes.
                    if view.prop_flags(p) & PROP_CONST != 0 {
                        return Ok(());
                    }
                }
                self.define(o, key, value, 0)
            }
            Value::Undefined | Value::Null => {
                let message = format!(
                    "Cannot set properties of {} (setting '{}')",
                    if object.is_undefined() { "undefined" } else { "null" },
                    String::from_utf8_lossy(self.realm.string_bytes(key))
                );
                Err(self.throw_error(ErrorKind::TypeError, &message))
            }
            _ => Ok(()),
        }
    }

    /// Evaluate arguments left to right, keeping earlier ones rooted.
    fn eval_args(&mut self, arguments: &[Expr]) -> JsResult<Vec<Value>> {
        let mark = self.pending.len();
        for arg in arguments {
            match self.eval(arg) {
                Ok(value) => self.pending.push(value),
                Err(err) => {
                    self.pending.truncate(mark);
                    return Err(err);
                }
            }
        }
        Ok(self.pending.split_off(mark))
    }

    /// Source-level name of a callee for error messages.
    fn describe(&self, expr: &Expr) -> String {
        match expr {
            Expr::Identifier(name) => String::from(self.program.atom(*name)),
            Expr::This => String::from("this"),
            Expr::Member(member) => match &member.property {
                PropertyName::Named(name) => {
                    format!("{}.{}", self.describe(&member.object), self.program.atom(*name))
                }
                PropertyName::Computed(_) => format!("{}[...]", self.describe(&member.object)),
            },
            _ => String::from("expression"),
        }
    }

    fn eval_call(&mut self, call: &CallExpr) -> JsResult<Value> {
        let (callee, this) = match &*call.callee {
            Expr::Member(member) => {
                let object = self.eval(&member.object)?;
                let key = self.with_roots(&[object], |interp| interp.property_key(&member.property))?;
                (self.get_property(object, key)?, object)
            }
            other => (self.eval(other)?, Value::Undefined),
        };
        let args = self.with_roots(&[callee, this], |interp| interp.eval_args(&call.arguments))?;

        if !self.realm.is_callable(callee) {
            let message = format!("{} is not a function", self.describe(&call.callee));
            return Err(self.throw_error(ErrorKind::TypeError, &message));
        }
        self.call(callee, this, &args)
    }

    fn eval_new(&mut self, call: &CallExpr) -> JsResult<Value> {
        let callee = self.eval(&call.callee)?;
        let args = self.with_roots(&[callee], |interp| interp.eval_args(&call.arguments))?;

        let f = match callee {
            Value::Function(f) => f,
            _ => return Err(self.not_a_constructor(&call.callee)),
        };
        let view = self.realm.heap.view();
        match view.class(f) {
            Some(Class::Intrinsic) => {
                let id = view.data(f, 0);
                self.call_intrinsic(id, &args)
            }
            Some(Class::Closure) if !self.is_arrow(f) => {
                let proto = self.prototype_of(f)?;
                let object = self.new_object(Class::Plain, Some(proto), [0; 3])?;
                let result = self.call(callee, Value::Object(object), &args)?;
                Ok(if result.as_object().is_some() {
                    result
                } else {
                    Value::Object(object)
                })
            }
            _ => Err(self.not_a_constructor(&call.callee)),
        }
    }

    fn not_a_constructor(&mut self, callee: &Expr) -> Exception {
        let message = format!("{} is not a constructor", self.describe(callee));
        self.throw_error(ErrorKind::TypeError, &message)
    }

    fn is_arrow(&self, f: ObjRef) -> bool {
        let view = self.realm.heap.view();
        let slot = view.data(f, 0) as usize;
        let id = view.data(f, 1) as usize;
        self.realm
            .programs
            .get(slot)
            .and_then(Option::as_ref)
            .and_then(|p| p.code.functions.get(id))
            .map_or(false, |info| info.is_arrow)
    }

    /// `F.prototype`, created on first use.
    fn prototype_of(&mut self, f: ObjRef) -> JsResult<ObjRef> {
        let key = self.realm.name(Name::Prototype);
        let view = self.realm.heap.view();
        if let Some(p) = view.find_own(f, view.string_bytes(key)) {
            if let Value::Object(proto) = view.prop_value(p) {
                return Ok(proto);
            }
        }
        let proto = self.new_object(Class::Plain, None, [0; 3])?;
        self.define(f, key, Value::Object(proto), 0)?;
        Ok(proto)
    }

    /// Call any callable value.
    fn call(&mut self, callee: Value, this: Value, args: &[Value]) -> JsResult<Value> {
        let f = match callee {
            Value::Function(f) => f,
            _ => return Err(self.throw_error(ErrorKind::TypeError, "not a function")),
        };
        if self.depth >= self.realm.config.max_call_depth {
            return Err(self.throw_error(ErrorKind::RangeError, "Maximum call stack size exceeded"));
        }

        self.depth += 1;
        let view = self.realm.heap.view();
        let result = match view.class(f) {
            Some(Class::Closure) => self.call_closure(f, this, args),
            Some(Class::Native) => {
                let id = view.data(f, 0);
                self.host.call_native(&mut *self.realm, id, this, args)
            }
            Some(Class::Intrinsic) => {
                let id = view.data(f, 0);
                self.call_intrinsic(id, args)
            }
            _ => Err(self.throw_error(ErrorKind::TypeError, "not a function")),
        };
        self.depth -= 1;
        result
    }

    fn call_closure(&mut self, f: ObjRef, this: Value, args: &[Value]) -> JsResult<Value> {
        let view = self.realm.heap.view();
        let slot = view.data(f, 0) as usize;
        let id = view.data(f, 1) as usize;
        let captured = ObjRef(view.data(f, 2));

        let code = match self.realm.programs.get(slot).and_then(Option::as_ref) {
            Some(program) => program.code.clone(),
            None => return Err(self.throw_error(ErrorKind::InternalError, "function code was released")),
        };
        let info = match code.functions.get(id) {
            Some(info) => info,
            None => return Err(self.throw_error(ErrorKind::InternalError, "function code was released")),
        };

        let scope = self.new_object(Class::Scope, Some(captured), [1, 0, 0])?;
        let saved_program = core::mem::replace(&mut self.program, code.clone());
        let saved_slot = core::mem::replace(&mut self.slot, slot);
        let saved_env = core::mem::replace(&mut self.env, scope);

        // The new scope hangs off `captured`, so the caller's chain needs
        // its own root.
        let result = self.with_roots(&[Value::Function(f), Value::Object(saved_env)], |interp| {
            interp.run_function(f, info, this, args)
        });

        self.program = saved_program;
        self.slot = saved_slot;
        self.env = saved_env;
        result
    }

    fn run_function(&mut self, f: ObjRef, info: &FunctionInfo, this: Value, args: &[Value]) -> JsResult<Value> {
        let scope = self.env;
        if !info.is_arrow {
            let this = if this.is_nullish() {
                Value::Object(self.realm.global)
            } else {
                this
            };
            let key = self.realm.name(Name::This);
            self.define(scope, key, this, 0)?;
        }

        for (i, &param) in info.params.iter().enumerate() {
            let key = self.atom(param);
            let value = args.get(i).copied().unwrap_or_default();
            self.define(scope, key, value, 0)?;
        }

        // A named function expression can refer to itself.
        if let Some(name) = info.name {
            if !self.has_own(scope, name) {
                let key = self.atom(name);
                self.define(scope, key, Value::Function(f), 0)?;
            }
        }

        self.hoist_vars(&info.var_names)?;

        match &info.body {
            FunctionBody::Block(body) => match self.exec_statements(body)? {
                Completion::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
            FunctionBody::Expr(expr) => self.eval(expr),
        }
    }

    fn call_intrinsic(&mut self, id: u32, args: &[Value]) -> JsResult<Value> {
        let first = args.first().copied();
        match Intrinsic::from_id(id) {
            Some(Intrinsic::Error(kind)) => {
                let message = match first {
                    Some(value) if !value.is_undefined() => Some(self.realm.render_to_string(value)?),
                    _ => None,
                };
                let proto = self.realm.error_proto(kind);
                let error = self.new_object(Class::Error, Some(proto), [kind.index() as u32, 0, 0])?;
                if let Some(message) = message {
                    let key = self.realm.name(Name::Message);
                    self.define(error, key, Value::String(message), 0)?;
                }
                Ok(Value::Object(error))
            }
            Some(Intrinsic::String) => match first {
                Some(value) => self.realm.render_to_string(value).map(Value::String),
                None => Ok(Value::String(self.realm.name(Name::Empty))),
            },
            Some(Intrinsic::Number) => {
                let n = first.map_or(0.0, |value| self.realm.to_number(value));
                Ok(Value::number(n))
            }
            None => Err(self.throw_error(ErrorKind::TypeError, "not a function")),
        }
    }

    fn eval_unary(&mut self, unary: &UnaryExpr) -> JsResult<Value> {
        if unary.operator == UnaryOp::Typeof {
            if let Expr::Identifier(name) = &*unary.argument {
                let view = self.realm.heap.view();
                if view.lookup(self.env, self.program.atom(*name).as_bytes()).is_none() {
                    return Ok(Value::String(self.realm.name(Name::Undefined)));
                }
            }
        }

        let value = self.eval(&unary.argument)?;
        Ok(match unary.operator {
            UnaryOp::Minus => Value::number(-self.realm.to_number(value)),
            UnaryOp::Plus => Value::number(self.realm.to_number(value)),
            UnaryOp::Not => Value::Bool(!self.realm.truthy(value)),
            UnaryOp::BitNot => Value::Int(!to_int32(self.realm.to_number(value))),
            UnaryOp::Typeof => Value::String(self.type_of(value)),
            UnaryOp::Void => Value::Undefined,
        })
    }

    fn type_of(&self, value: Value) -> StrRef {
        let name = match value {
            Value::Undefined => Name::Undefined,
            Value::Null | Value::Object(_) => Name::Object,
            Value::Bool(_) => Name::Boolean,
            Value::Int(_) | Value::Float(_) => Name::Number,
            Value::String(_) => Name::String,
            Value::Function(_) => Name::Function,
        };
        self.realm.name(name)
    }

    fn place(&mut self, target: &Expr) -> JsResult<Place> {
        match target {
            Expr::Identifier(name) => Ok(Place::Var(*name)),
            Expr::Member(member) => {
                let object = self.eval(&member.object)?;
                let key = self.with_roots(&[object], |interp| interp.property_key(&member.property))?;
                Ok(Place::Property(object, key))
            }
            _ => Err(self.throw_error(ErrorKind::SyntaxError, "Invalid assignment target")),
        }
    }

    fn read(&mut self, place: &Place) -> JsResult<Value> {
        match place {
            Place::Var(name) => self.get_var(*name),
            Place::Property(object, key) => self.get_property(*object, *key),
        }
    }

    fn write(&mut self, place: &Place, value: Value) -> JsResult<()> {
        match place {
            Place::Var(name) => self.assign_var(*name, value),
            Place::Property(object, key) => self.set_property(*object, *key, value),
        }
    }

    fn eval_update(&mut self, update: &UpdateExpr) -> JsResult<Value> {
        let place = self.place(&update.argument)?;
        let old = self.read(&place)?;
        let old = self.realm.to_number(old);
        let new = match update.operator {
            UpdateOp::Increment => old + 1.0,
            UpdateOp::Decrement => old - 1.0,
        };
        self.write(&place, Value::number(new))?;
        Ok(Value::number(if update.prefix { new } else { old }))
    }

    fn eval_assignment(&mut self, assign: &AssignmentExpr) -> JsResult<Value> {
        let place = self.place(&assign.target)?;
        let held = match &place {
            Place::Property(object, key) => [*object, Value::String(*key)],
            Place::Var(_) => [Value::Undefined; 2],
        };
        let value = self.with_roots(&held, |interp| match assign.operator.binary() {
            None => interp.eval(&assign.value),
            Some(op) => {
                let old = interp.read(&place)?;
                let rhs = interp.with_roots(&[old], |interp| interp.eval(&assign.value))?;
                interp.binary(op, old, rhs)
            }
        })?;
        self.write(&place, value)?;
        Ok(value)
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> JsResult<Value> {
        if op == BinaryOp::Add {
            return self.add(left, right);
        }
        Ok(self.arithmetic(op, left, right))
    }

    /// Operators that never allocate. `Add` here is numeric addition.
    fn arithmetic(&self, op: BinaryOp, left: Value, right: Value) -> Value {
        let num = |v: Value| self.realm.to_number(v);

        match op {
            BinaryOp::Add => Value::number(num(left) + num(right)),
            BinaryOp::Sub => Value::number(num(left) - num(right)),
            BinaryOp::Mul => Value::number(num(left) * num(right)),
            BinaryOp::Div => Value::number(num(left) / num(right)),
            BinaryOp::Mod => Value::number(libm::fmod(num(left), num(right))),
            BinaryOp::Exp => Value::number(power(num(left), num(right))),
            BinaryOp::Equal => Value::Bool(self.loose_equals(left, right)),
            BinaryOp::NotEqual => Value::Bool(!self.loose_equals(left, right)),
            BinaryOp::StrictEqual => Value::Bool(self.strict_equals(left, right)),
            BinaryOp::StrictNotEqual => Value::Bool(!self.strict_equals(left, right)),
            BinaryOp::LessThan => Value::Bool(self.compare(left, right) == Some(Ordering::Less)),
            BinaryOp::GreaterThan => Value::Bool(self.compare(left, right) == Some(Ordering::Greater)),
            BinaryOp::LessEqual => Value::Bool(matches!(
                self.compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::GreaterEqual => Value::Bool(matches!(
                self.compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::LeftShift => {
                Value::Int(to_int32(num(left)).wrapping_shl(to_uint32(num(right)) & 31))
            }
            BinaryOp::RightShift => Value::Int(to_int32(num(left)) >> (to_uint32(num(right)) & 31)),
            BinaryOp::UnsignedRightShift => {
                Value::number((to_uint32(num(left)) >> (to_uint32(num(right)) & 31)) as f64)
            }
            BinaryOp::BitAnd => Value::Int(to_int32(num(left)) & to_int32(num(right))),
            BinaryOp::BitOr => Value::Int(to_int32(num(left)) | to_int32(num(right))),
            BinaryOp::BitXor => Value::Int(to_int32(num(left)) ^ to_int32(num(right))),
        }
    }

    fn add(&mut self, left: Value, right: Value) -> JsResult<Value> {
        let textual = |v: Value| matches!(v, Value::String(_) | Value::Object(_) | Value::Function(_));
        if !textual(left) && !textual(right) {
            return Ok(self.arithmetic(BinaryOp::Add, left, right));
        }

        let a = self.realm.render_to_string(left)?;
        let b = self.realm.render_to_string(right)?;
        match self.realm.heap.concat(a, b, Reserve::Normal) {
            Ok(s) => Ok(Value::String(s)),
            Err(_) => Err(self.realm.throw_out_of_memory()),
        }
    }

    fn compare(&self, left: Value, right: Value) -> Option<Ordering> {
        if let (Value::String(a), Value::String(b)) = (left, right) {
            return Some(self.realm.string_bytes(a).cmp(self.realm.string_bytes(b)));
        }
        self.realm
            .to_number(left)
            .partial_cmp(&self.realm.to_number(right))
    }

    fn strict_equals(&self, left: Value, right: Value) -> bool {
        match (left, right) {
            (Value::String(a), Value::String(b)) => {
                self.realm.string_bytes(a) == self.realm.string_bytes(b)
            }
            _ if left.is_number() && right.is_number() => left.as_number() == right.as_number(),
            (Value::Object(a), Value::Object(b)) | (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        }
    }

    fn loose_equals(&self, left: Value, right: Value) -> bool {
        match (left, right) {
            _ if left.is_nullish() || right.is_nullish() => left.is_nullish() && right.is_nullish(),
            (Value::Bool(b), other) | (other, Value::Bool(b)) => {
                self.loose_equals(Value::Int(b as i32), other)
            }
            (Value::String(_), other) | (other, Value::String(_)) if other.is_number() => {
                self.realm.to_number(left) == self.realm.to_number(right)
            }
            _ => self.strict_equals(left, right),
        }
    }
}

/// `**` with the ECMAScript special cases `pow` does not share.
fn power(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    libm::pow(base, exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::realm::{EvalFlags, RealmConfig};

    struct NoHost;

    impl Host for NoHost {
        fn call_native(&mut self, realm: &mut Realm<'_>, _id: u32, _this: Value, _args: &[Value]) -> JsResult<Value> {
            Err(realm.throw_error(ErrorKind::InternalError, "no natives"))
        }
    }

    fn run_with(config: RealmConfig, src: &str) -> String {
        let mut buf = alloc::vec![0u8; 64 * 1024];
        let mut realm = Realm::new(Arena::new(&mut buf), config).unwrap();
        let mut out = String::new();
        match realm.eval(&mut NoHost, src.as_bytes(), "<test>", EvalFlags::empty()) {
            Ok(value) => realm.render(value, &mut out).unwrap(),
            Err(_) => {
                out.push_str("throw ");
                let thrown = realm.exception().unwrap();
                realm.render(thrown, &mut out).unwrap();
            }
        }
        out
    }

    fn run(src: &str) -> String {
        run_with(RealmConfig::default(), src)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("1 + 2 * 3"), "7");
        assert_eq!(run("7 / 2"), "3.5");
        assert_eq!(run("-7 % 3"), "-1");
        assert_eq!(run("2 ** 10"), "1024");
        assert_eq!(run("2 ** 3 ** 2"), "512");
        assert_eq!(run("1 / 0"), "Infinity");
        assert_eq!(run("0 / 0"), "NaN");
        assert_eq!(run("2147483647 + 1"), "2147483648");
        assert_eq!(run("5 >>> 1"), "2");
        assert_eq!(run("-1 >>> 0"), "4294967295");
        assert_eq!(run("~5 & 0xff | 1 ^ 3"), "250");
    }

    #[test]
    fn test_strings() {
        assert_eq!(run("'a' + 1 + 2"), "a12");
        assert_eq!(run("1 + 2 + 'a'"), "3a");
        assert_eq!(run("'héllo'.length"), "5");
        assert_eq!(run("var s = ''; for (var i = 0; i < 3; i++) { s += i; } s"), "012");
        assert_eq!(run("'b' > 'a'"), "true");
        assert_eq!(run("String(12.5) + String()"), "12.5");
        assert_eq!(run("Number('0x10') + Number(' 2 ')"), "18");
    }

    #[test]
    fn test_equality() {
        assert_eq!(run("1 == '1'"), "true");
        assert_eq!(run("1 === '1'"), "false");
        assert_eq!(run("null == undefined"), "true");
        assert_eq!(run("null === undefined"), "false");
        assert_eq!(run("NaN == NaN"), "false");
        assert_eq!(run("true == 1"), "true");
        assert_eq!(run("var o = {}; o == o"), "true");
        assert_eq!(run("({}) == ({})"), "false");
    }

    #[test]
    fn test_typeof() {
        assert_eq!(run("typeof 1"), "number");
        assert_eq!(run("typeof 'x'"), "string");
        assert_eq!(run("typeof null"), "object");
        assert_eq!(run("typeof function () {}"), "function");
        assert_eq!(run("typeof missing"), "undefined");
        assert_eq!(run("typeof Error"), "function");
    }

    #[test]
    fn test_functions_and_closures() {
        assert_eq!(run("function add(a, b) { return a + b; } add(2, 3)"), "5");
        assert_eq!(
            run("function counter() { var n = 0; return function () { n++; return n; }; } var c = counter(); c(); c(); c()"),
            "3"
        );
        assert_eq!(run("var sq = x => x * x; sq(9)"), "81");
        assert_eq!(run("var f = (a, b) => { return a - b; }; f(5, 8)"), "-3");
        assert_eq!(run("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } fib(15)"), "610");
        assert_eq!(run("var f = function g(n) { return n ? g(n - 1) + 1 : 0; }; f(4)"), "4");
        assert_eq!(run("hoisted(); function hoisted() { return 'ok'; }"), "ok");
        assert_eq!(run("function f() {} f()"), "undefined");
    }

    #[test]
    fn test_function_renders_as_source() {
        assert_eq!(run("function f(a) { return a; }\nf"), "function f(a) { return a; }");
        assert_eq!(run("Error"), "function Error() {\n    [native code]\n}");
    }

    #[test]
    fn test_objects_and_this() {
        assert_eq!(run("var o = { x: 1, 'y': 2 }; o.x + o['y']"), "3");
        assert_eq!(run("var o = { n: 4, get() { return this.n; } }; o.get()"), "4");
        assert_eq!(run("var o = {}; o.a = {}; o.a.b = 5; o.a.b"), "5");
        assert_eq!(run("var o = {}; o[1 + 1] = 'two'; o['2']"), "two");
        assert_eq!(run("({}).missing"), "undefined");
        assert_eq!(run("String({})"), "[object Object]");
        assert_eq!(run("function P(x) { this.x = x; } var p = new P(3); p.x"), "3");
        assert_eq!(run("function P() {} P.prototype.k = 9; new P().k"), "9");
        assert_eq!(run("this === globalThis"), "true");
        assert_eq!(run("var self = { f() { return (() => this)(); } }; self.f() === self"), "true");
    }

    #[test]
    fn test_block_scoping() {
        assert_eq!(run("let a = 1; { let a = 2; } a"), "1");
        assert_eq!(run("var a = 1; { var a = 2; } a"), "2");
        assert_eq!(run("let t = 0; for (let i = 0; i < 4; i++) { t += i; } t"), "6");
        assert_eq!(run("const k = 1; k = 2"), "throw TypeError: Assignment to constant variable.");
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(run("var n = 0; while (true) { n++; if (n > 5) break; } n"), "6");
        assert_eq!(run("var n = 0; do { n += 2; } while (n < 7); n"), "8");
        assert_eq!(run("var s = 0; for (var i = 0; i < 10; i++) { if (i % 2) continue; s += i; } s"), "20");
        assert_eq!(run("var x = 0; if (x) { 'yes' } else { 'no' }"), "no");
        assert_eq!(run("null ?? 'fallback'"), "fallback");
        assert_eq!(run("0 || 'or'"), "or");
        assert_eq!(run("1 && 'and'"), "and");
        assert_eq!(run("var i = 5; i--, i--, i"), "3");
    }

    #[test]
    fn test_exceptions() {
        assert_eq!(run("throw 42"), "throw 42");
        assert_eq!(run("missing + 1"), "throw ReferenceError: missing is not defined");
        assert_eq!(run("var o; o.x"), "throw TypeError: Cannot read properties of undefined (reading 'x')");
        assert_eq!(run("var o = {}; o.f()"), "throw TypeError: o.f is not a function");
        assert_eq!(run("try { throw new TypeError('bad'); } catch (e) { 'caught ' + e }"), "caught TypeError: bad");
        assert_eq!(run("try { null.x; } catch (e) { e.name }"), "TypeError");
        assert_eq!(run("var log = ''; try { log += 'a'; } finally { log += 'b'; } log"), "ab");
        assert_eq!(
            run("var log = ''; try { try { throw 1; } finally { log += 'f'; } } catch (e) { log += e; } log"),
            "f1"
        );
        assert_eq!(run("function f() { try { return 'try'; } finally { 'ignored'; } } f()"), "try");
        assert_eq!(run("Error('plain').message"), "plain");
        assert_eq!(run("new RangeError().message"), "");
        assert_eq!(run("new InternalError('x') + ''"), "InternalError: x");
    }

    #[test]
    fn test_call_depth_limit() {
        let config = RealmConfig {
            max_call_depth: 32,
            ..RealmConfig::default()
        };
        assert_eq!(
            run_with(config, "function f() { return f(); } f()"),
            "throw RangeError: Maximum call stack size exceeded"
        );
        assert_eq!(
            run_with(config, "function f() { return f(); } try { f(); } catch (e) { 'recovered' }"),
            "recovered"
        );
    }

    #[test]
    fn test_garbage_loop_does_not_exhaust_arena() {
        let config = RealmConfig {
            gc_threshold: 2 * 1024,
            ..RealmConfig::default()
        };
        let mut buf = alloc::vec![0u8; 12 * 1024];
        let mut realm = Realm::new(Arena::new(&mut buf), config).unwrap();
        let src = b"var last; for (var i = 0; i < 2000; i++) { last = 'item ' + i; } last";
        let value = realm.eval(&mut NoHost, src, "<test>", EvalFlags::empty()).unwrap();
        let mut out = String::new();
        realm.render(value, &mut out).unwrap();
        assert_eq!(out, "item 1999");
    }

    #[test]
    fn test_collection_inside_function_calls() {
        let config = RealmConfig {
            gc_threshold: 1024,
            ..RealmConfig::default()
        };
        let mut buf = alloc::vec![0u8; 12 * 1024];
        let mut realm = Realm::new(Arena::new(&mut buf), config).unwrap();
        let src = b"function f() { var last; for (var i = 0; i < 2000; i++) { last = 'item ' + i; } return last; } f()";
        let value = realm.eval(&mut NoHost, src, "<test>", EvalFlags::empty()).unwrap();
        let mut out = String::new();
        realm.render(value, &mut out).unwrap();
        assert_eq!(out, "item 1999");
    }

    #[test]
    fn test_held_operands_survive_collection_in_callee() {
        let config = RealmConfig {
            gc_threshold: 64,
            ..RealmConfig::default()
        };
        let prelude = "function g() { var t; for (var i = 0; i < 20; i++) { t = 'x' + i; } return 'right'; } \
                       function h() { return 'left ' + 'side'; } ";
        let cases = [
            ("h() + g()", "left sideright"),
            ("function pair(a, b) { return a + '/' + b; } pair(h(), g())", "left side/right"),
            ("var o = { a: h(), b: g() }; o.a + o.b", "left sideright"),
            ("var box = {}; box['k' + 1] = g(); box.k1", "right"),
            ("var s = { v: 'a' + 'b' }; s.v += g(); s.v", "abright"),
            ("var c = { m: function () { return this.tag; }, tag: 'c' + 1 }; c.m(g())", "c1"),
            ("function Box(v) { this.v = v; } new Box(h() + g()).v", "left sideright"),
        ];
        for (body, expected) in cases {
            let src = alloc::format!("{}{}", prelude, body);
            assert_eq!(run_with(config, &src), expected, "{}", body);
        }
    }

    #[test]
    fn test_deep_recursion_collects() {
        assert_eq!(run("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } fib(20)"), "6765");
        assert_eq!(
            run("function build(n) { if (n == 0) { return ''; } return build(n - 1) + n % 10; } build(60).length"),
            "60"
        );
    }
}
