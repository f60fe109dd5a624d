//! Tree-walking evaluator for parsed chunks.
//!
//! Locals live in a persistent linked list of bindings: every `local` pushes a new
//! node and closures capture the node current at their creation, so they see
//! exactly the locals declared before them. Loop bodies start from the outer
//! environment on each iteration, giving every iteration fresh locals.

#[cfg(test)]
mod interp_test;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, anyhow};

use crate::ast::{Block, Expr, Field, FuncBody, Name, Stmt, StmtKind};
use crate::op::BinOp;
use crate::state::{ScriptError, State};
use crate::val::{Function, LuaClosure, Table, TableRef, Val, float_to_integer};

pub(crate) type Env = Option<Rc<Binding>>;

pub(crate) struct Binding {
    name: Name,
    cell: RefCell<Val>,
    parent: Env,
}

fn bind(env: Env, name: Name, value: Val) -> Env {
    Some(Rc::new(Binding {
        name,
        cell: RefCell::new(value),
        parent: env,
    }))
}

fn lookup<'e>(env: &'e Env, name: &str) -> Option<&'e Binding> {
    let mut cur = env.as_deref();
    while let Some(b) = cur {
        if &*b.name == name {
            return Some(b);
        }
        cur = b.parent.as_deref();
    }
    None
}

enum Flow {
    Normal,
    Break,
    Return(Vec<Val>),
}

/// Builds the closure for a freshly loaded chunk.
pub(crate) fn chunk_closure(body: Block, globals: TableRef, chunk: Rc<str>) -> Val {
    let proto = Rc::new(FuncBody {
        params: Vec::new(),
        is_vararg: true,
        body,
        name: Some("main chunk".to_string()),
        line: 0,
    });
    Val::Function(Function::Lua(Rc::new(LuaClosure {
        proto,
        env: None,
        globals,
        chunk,
    })))
}

pub(crate) fn call_lua(state: &State, closure: &Rc<LuaClosure>, args: Vec<Val>) -> Result<Vec<Val>> {
    let proto = &closure.proto;
    let mut env = closure.env.clone();
    let mut args = args.into_iter();
    for param in &proto.params {
        env = bind(env, param.clone(), args.next().unwrap_or_default());
    }
    let varargs = if proto.is_vararg { args.collect() } else { Vec::new() };
    let mut exec = Exec {
        state,
        globals: closure.globals.clone(),
        varargs,
        chunk: closure.chunk.clone(),
    };
    match exec.exec_block(&proto.body, env)? {
        Flow::Return(values) => Ok(values),
        Flow::Normal | Flow::Break => Ok(Vec::new()),
    }
}

/// Where a value came from, for error messages such as `(global 'x')`.
fn describe(expr: &Expr, env: &Env) -> String {
    match expr {
        Expr::Name(n) if lookup(env, n).is_some() => format!(" (local '{}')", n),
        Expr::Name(n) => format!(" (global '{}')", n),
        Expr::Index(_, key) => match key.as_ref() {
            Expr::Str(k) => format!(" (field '{}')", k),
            _ => String::new(),
        },
        Expr::Method(_, m, _) => format!(" (method '{}')", m),
        _ => String::new(),
    }
}

enum Place {
    Local(Rc<Binding>),
    Global(Name),
    Field(TableRef, Val),
}

struct Exec<'s> {
    state: &'s State,
    globals: TableRef,
    varargs: Vec<Val>,
    chunk: Rc<str>,
}

impl Exec<'_> {
    fn locate(&self, err: anyhow::Error, line: u32) -> anyhow::Error {
        if err.is::<ScriptError>() {
            err
        } else {
            anyhow::Error::new(ScriptError::new(format!("{}:{}: {}", self.chunk, line, err)))
        }
    }

    fn exec_block(&mut self, block: &Block, env: Env) -> Result<Flow> {
        let mut env = env;
        self.exec_stmts(block, &mut env)
    }

    fn exec_stmts(&mut self, block: &Block, env: &mut Env) -> Result<Flow> {
        for stmt in block {
            match self.exec_stmt(stmt, env) {
                Ok(Flow::Normal) => {}
                Ok(flow) => return Ok(flow),
                Err(err) => return Err(self.locate(err, stmt.line)),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &mut Env) -> Result<Flow> {
        match &stmt.kind {
            StmtKind::Local { names, values } => {
                let mut values = self.eval_list(values, env)?.into_iter();
                for name in names {
                    *env = bind(env.take(), name.clone(), values.next().unwrap_or_default());
                }
            }
            StmtKind::LocalFunction { name, func } => {
                *env = bind(env.take(), name.clone(), Val::Nil);
                let closure = self.make_closure(func, env);
                if let Some(b) = env.as_deref() {
                    *b.cell.borrow_mut() = closure;
                }
            }
            StmtKind::Assign { targets, values } => {
                let mut places = Vec::with_capacity(targets.len());
                for target in targets {
                    places.push(self.place(target, env)?);
                }
                let mut values = self.eval_list(values, env)?.into_iter();
                for place in places {
                    self.assign(place, values.next().unwrap_or_default())?;
                }
            }
            StmtKind::Call(expr) => {
                self.eval_multi(expr, env)?;
            }
            StmtKind::Do(body) => return self.exec_block(body, env.clone()),
            StmtKind::While { cond, body } => {
                while self.eval(cond, env)?.truthy() {
                    match self.exec_block(body, env.clone())? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal => {}
                    }
                }
            }
            StmtKind::Repeat { body, cond } => loop {
                // The condition sees the body's locals
                let mut inner = env.clone();
                match self.exec_stmts(body, &mut inner)? {
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                    Flow::Normal => {}
                }
                if self.eval(cond, &inner)?.truthy() {
                    break;
                }
            },
            StmtKind::If { branches, else_block } => {
                for (cond, body) in branches {
                    if self.eval(cond, env)?.truthy() {
                        return self.exec_block(body, env.clone());
                    }
                }
                if let Some(body) = else_block {
                    return self.exec_block(body, env.clone());
                }
            }
            StmtKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => return self.exec_numeric_for(var, start, limit, step.as_ref(), body, env),
            StmtKind::GenericFor { names, exprs, body } => {
                let mut init = self.eval_list(exprs, env)?.into_iter();
                let func = init.next().unwrap_or_default();
                let invariant = init.next().unwrap_or_default();
                let mut control = init.next().unwrap_or_default();
                if !matches!(func, Val::Function(_)) {
                    return Err(anyhow!("attempt to call a {} value", func.type_name()));
                }
                loop {
                    let results = self.state.call_value(&func, vec![invariant.clone(), control.clone()])?;
                    let mut results = results.into_iter();
                    let first = results.next().unwrap_or_default();
                    if first.is_nil() {
                        break;
                    }
                    control = first.clone();
                    let mut iter_env = bind(env.clone(), names[0].clone(), first);
                    for name in &names[1..] {
                        iter_env = bind(iter_env, name.clone(), results.next().unwrap_or_default());
                    }
                    match self.exec_block(body, iter_env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal => {}
                    }
                }
            }
            StmtKind::Return(values) => return Ok(Flow::Return(self.eval_list(values, env)?)),
            StmtKind::Break => return Ok(Flow::Break),
        }
        Ok(Flow::Normal)
    }

    fn exec_numeric_for(
        &mut self,
        var: &Name,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
        env: &Env,
    ) -> Result<Flow> {
        let start = self.eval(start, env)?;
        let limit = self.eval(limit, env)?;
        let step = match step {
            Some(e) => self.eval(e, env)?,
            None => Val::Int(1),
        };

        if let (Val::Int(first), Val::Int(step)) = (&start, &step) {
            let mut i = *first;
            let step = *step;
            if step == 0 {
                return Err(anyhow!("'for' step is zero"));
            }
            let limit = match limit {
                Val::Int(l) => l,
                ref other => match other.to_number() {
                    Some(f) if f.is_nan() => return Ok(Flow::Normal),
                    Some(f) => {
                        let f = if step > 0 { f.floor() } else { f.ceil() };
                        float_to_integer(f).unwrap_or(if f > 0.0 { i64::MAX } else { i64::MIN })
                    }
                    None => return Err(anyhow!("'for' limit must be a number")),
                },
            };
            while (step > 0 && i <= limit) || (step < 0 && i >= limit) {
                match self.exec_block(body, bind(env.clone(), var.clone(), Val::Int(i)))? {
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                    Flow::Normal => {}
                }
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
            return Ok(Flow::Normal);
        }

        let Some(mut i) = start.to_number() else {
            return Err(anyhow!("'for' initial value must be a number"));
        };
        let Some(limit) = limit.to_number() else {
            return Err(anyhow!("'for' limit must be a number"));
        };
        let Some(step) = step.to_number() else {
            return Err(anyhow!("'for' step must be a number"));
        };
        if step == 0.0 {
            return Err(anyhow!("'for' step is zero"));
        }
        while (step > 0.0 && i <= limit) || (step < 0.0 && i >= limit) {
            match self.exec_block(body, bind(env.clone(), var.clone(), Val::Float(i)))? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal => {}
            }
            i += step;
        }
        Ok(Flow::Normal)
    }

    fn place(&mut self, target: &Expr, env: &Env) -> Result<Place> {
        match target {
            Expr::Name(n) => match env_binding(env, n) {
                Some(b) => Ok(Place::Local(b)),
                None => Ok(Place::Global(n.clone())),
            },
            Expr::Index(obj, key) => {
                let o = self.eval(obj, env)?;
                let k = self.eval(key, env)?;
                match o {
                    Val::Table(t) => Ok(Place::Field(t, k)),
                    other => Err(anyhow!(
                        "attempt to index a {} value{}",
                        other.type_name(),
                        describe(obj, env)
                    )),
                }
            }
            _ => Err(anyhow!("cannot assign to this expression")),
        }
    }

    fn assign(&mut self, place: Place, value: Val) -> Result<()> {
        match place {
            Place::Local(b) => *b.cell.borrow_mut() = value,
            Place::Global(n) => self.globals.borrow_mut().set(Val::Str(n), value)?,
            Place::Field(t, k) => t.borrow_mut().set(k, value)?,
        }
        Ok(())
    }

    fn make_closure(&self, body: &Rc<FuncBody>, env: &Env) -> Val {
        Val::Function(Function::Lua(Rc::new(LuaClosure {
            proto: body.clone(),
            env: env.clone(),
            globals: self.globals.clone(),
            chunk: self.chunk.clone(),
        })))
    }

    fn index(&self, obj: &Val, key: &Val, origin: &Expr, env: &Env) -> Result<Val> {
        match obj {
            Val::Table(t) => Ok(t.borrow().get(key)),
            Val::Str(_) => match self.state.string_methods() {
                Some(methods) => Ok(methods.borrow().get(key)),
                None => Err(anyhow!("attempt to index a string value{}", describe(origin, env))),
            },
            other => Err(anyhow!(
                "attempt to index a {} value{}",
                other.type_name(),
                describe(origin, env)
            )),
        }
    }

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Val> {
        Ok(match expr {
            Expr::Nil => Val::Nil,
            Expr::Bool(b) => Val::Bool(*b),
            Expr::Int(i) => Val::Int(*i),
            Expr::Float(f) => Val::Float(*f),
            Expr::Str(s) => Val::Str(s.clone()),
            Expr::Vararg => self.varargs.first().cloned().unwrap_or_default(),
            Expr::Function(body) => self.make_closure(body, env),
            Expr::Name(n) => match lookup(env, n) {
                Some(b) => b.cell.borrow().clone(),
                None => self.globals.borrow().get(&Val::Str(n.clone())),
            },
            Expr::Index(obj, key) => {
                let o = self.eval(obj, env)?;
                let k = self.eval(key, env)?;
                self.index(&o, &k, obj, env)?
            }
            Expr::Call(..) | Expr::Method(..) => self.eval_multi(expr, env)?.into_iter().next().unwrap_or_default(),
            Expr::Paren(inner) => self.eval(inner, env)?,
            Expr::Table(fields) => self.eval_table(fields, env)?,
            Expr::Bin(BinOp::And, l, r) => {
                let lv = self.eval(l, env)?;
                if lv.truthy() { self.eval(r, env)? } else { lv }
            }
            Expr::Bin(BinOp::Or, l, r) => {
                let lv = self.eval(l, env)?;
                if lv.truthy() { lv } else { self.eval(r, env)? }
            }
            Expr::Bin(op, l, r) => {
                let lv = self.eval(l, env)?;
                let rv = self.eval(r, env)?;
                op.eval_val(&lv, &rv)?
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand, env)?;
                op.eval_val(&v)?
            }
        })
    }

    /// All values of an expression list, with the last multi-valued expression expanded.
    fn eval_list(&mut self, exprs: &[Expr], env: &Env) -> Result<Vec<Val>> {
        let mut out = Vec::with_capacity(exprs.len());
        for (i, expr) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() && expr.is_multi() {
                out.extend(self.eval_multi(expr, env)?);
            } else {
                out.push(self.eval(expr, env)?);
            }
        }
        Ok(out)
    }

    fn eval_multi(&mut self, expr: &Expr, env: &Env) -> Result<Vec<Val>> {
        match expr {
            Expr::Vararg => Ok(self.varargs.clone()),
            Expr::Call(func, args) => {
                let f = self.eval(func, env)?;
                if !matches!(f, Val::Function(_)) {
                    return Err(anyhow!("attempt to call a {} value{}", f.type_name(), describe(func, env)));
                }
                let args = self.eval_list(args, env)?;
                self.state.call_value(&f, args)
            }
            Expr::Method(obj, method, args) => {
                let o = self.eval(obj, env)?;
                let f = self.index(&o, &Val::Str(method.clone()), obj, env)?;
                if !matches!(f, Val::Function(_)) {
                    return Err(anyhow!("attempt to call a {} value{}", f.type_name(), describe(expr, env)));
                }
                let mut argv = Vec::with_capacity(args.len() + 1);
                argv.push(o);
                argv.extend(self.eval_list(args, env)?);
                self.state.call_value(&f, argv)
            }
            other => Ok(vec![self.eval(other, env)?]),
        }
    }

    fn eval_table(&mut self, fields: &[Field], env: &Env) -> Result<Val> {
        let mut table = Table::new();
        let mut next_index = 1;
        for (i, field) in fields.iter().enumerate() {
            match field {
                Field::Positional(expr) if i + 1 == fields.len() && expr.is_multi() => {
                    for v in self.eval_multi(expr, env)? {
                        table.set_int(next_index, v);
                        next_index += 1;
                    }
                }
                Field::Positional(expr) => {
                    let v = self.eval(expr, env)?;
                    table.set_int(next_index, v);
                    next_index += 1;
                }
                Field::Named(name, expr) => {
                    let v = self.eval(expr, env)?;
                    table.set_str(name, v);
                }
                Field::Keyed(key, expr) => {
                    let k = self.eval(key, env)?;
                    let v = self.eval(expr, env)?;
                    table.set(k, v)?;
                }
            }
        }
        Ok(Val::table(table))
    }
}

fn env_binding(env: &Env, name: &str) -> Option<Rc<Binding>> {
    let mut cur = env.clone();
    while let Some(b) = cur {
        if &*b.name == name {
            return Some(b);
        }
        cur = b.parent.clone();
    }
    None
}
