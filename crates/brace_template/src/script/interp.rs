//! Tree-walking interpreter for compiled templates.
//!
//! A run owns its [`Scope`] and output buffer. Literal text is appended to
//! the buffer as-is, output directives append their stringified value, and
//! every other statement runs against the scope. The buffer is only handed
//! back when the whole program completes.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::ast::{BinOp, Expr, LogicalOp, PathSeg, Place, Program, Stmt, StmtKind, UnaryOp};
use super::builtins::call_builtin;
use super::value::{compare, is_truthy, loose_eq, to_num, to_output, type_name, Num};
use super::Fault;

/// Variables visible to directive code, by name.
pub type Scope = HashMap<String, Value>;

/// Run a compiled program against `scope` and return its output.
pub fn run(program: &Program, scope: Scope) -> Result<String, Fault> {
    let mut interp = Interpreter {
        scope,
        out: String::new(),
    };
    match interp.exec_block(&program.body)? {
        Flow::Normal => Ok(interp.out),
        Flow::Break(line) => Err(Fault::new("'break' outside of a loop", line)),
        Flow::Continue(line) => Err(Fault::new(
            "'continue' outside of a loop",
            line,
        )),
    }
}

enum Flow {
    Normal,
    Break(usize),
    Continue(usize),
}

/// A resolved step of an assignment path.
enum Key {
    Index(Value),
    Member(String),
    Append,
}

struct Interpreter {
    scope: Scope,
    out: String,
}

impl Interpreter {
    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, Fault> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, Fault> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Text(text) => self.out.push_str(text),
            StmtKind::Echo(exprs) => {
                for expr in exprs {
                    let value = self.eval(expr, line)?;
                    self.out.push_str(&to_output(&value));
                }
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, line)?;
            }
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if is_truthy(&self.eval(cond, line)?) {
                        return self.exec_block(body);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(body);
                }
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                for expr in init {
                    self.eval(expr, line)?;
                }
                loop {
                    // Every condition runs; the last one decides.
                    let mut proceed = true;
                    for expr in cond {
                        proceed = is_truthy(&self.eval(expr, line)?);
                    }
                    if !proceed {
                        break;
                    }
                    if let Flow::Break(_) = self.exec_block(body)? {
                        break;
                    }
                    for expr in step {
                        self.eval(expr, line)?;
                    }
                }
            }
            StmtKind::Foreach {
                subject,
                key,
                value,
                body,
            } => {
                let entries: Vec<(Value, Value)> = match self.eval(subject, line)? {
                    Value::Array(items) => items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (Value::from(i), v))
                        .collect(),
                    Value::Object(map) => map
                        .into_iter()
                        .map(|(k, v)| (Value::String(k), v))
                        .collect(),
                    other => {
                        return Err(Fault::new(
                            format!(
                                "foreach() argument must be of type array|object, {} given",
                                type_name(&other)
                            ),
                            line,
                        ))
                    }
                };
                for (k, v) in entries {
                    if let Some(key) = key {
                        self.scope.insert(key.clone(), k);
                    }
                    self.scope.insert(value.clone(), v);
                    if let Flow::Break(_) = self.exec_block(body)? {
                        break;
                    }
                }
            }
            StmtKind::While { cond, body } => {
                while is_truthy(&self.eval(cond, line)?) {
                    if let Flow::Break(_) = self.exec_block(body)? {
                        break;
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break(line)),
            StmtKind::Continue => return Ok(Flow::Continue(line)),
        }
        Ok(Flow::Normal)
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr, line: usize) -> Result<Value, Fault> {
        let fault = |message: String| Fault::new(message, line);
        match expr {
            Expr::At(line, inner) => self.eval(inner, *line),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item, line))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Object(pairs) => {
                let mut map = Map::new();
                for (key, value) in pairs {
                    let key = to_output(&self.eval(key, line)?);
                    let value = self.eval(value, line)?;
                    map.insert(key, value);
                }
                Ok(Value::Object(map))
            }
            Expr::Var(name) => self
                .scope
                .get(name)
                .cloned()
                .ok_or_else(|| fault(format!("Undefined variable ${name}"))),
            Expr::Index(base, key) => {
                let base = self.eval(base, line)?;
                let key = self.eval(key, line)?;
                index(&base, &key).map_err(fault)
            }
            Expr::Append(_) => Err(fault("Cannot use [] for reading".to_string())),
            Expr::Member(base, field) => {
                let base = self.eval(base, line)?;
                member(&base, field).map_err(fault)
            }
            Expr::Unary(UnaryOp::Not, operand) => {
                Ok(Value::Bool(!is_truthy(&self.eval(operand, line)?)))
            }
            Expr::Unary(UnaryOp::Neg, operand) => {
                let value = self.eval(operand, line)?;
                negate(&value).map_err(fault)
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs, line)?;
                let b = self.eval(rhs, line)?;
                binary(*op, &a, &b).map_err(fault)
            }
            Expr::Logical(LogicalOp::And, lhs, rhs) => {
                let result = is_truthy(&self.eval(lhs, line)?) && is_truthy(&self.eval(rhs, line)?);
                Ok(Value::Bool(result))
            }
            Expr::Logical(LogicalOp::Or, lhs, rhs) => {
                let result = is_truthy(&self.eval(lhs, line)?) || is_truthy(&self.eval(rhs, line)?);
                Ok(Value::Bool(result))
            }
            Expr::Logical(LogicalOp::Coalesce, lhs, rhs) => match self.lookup(lhs, line)? {
                Some(value) if !value.is_null() => Ok(value),
                _ => self.eval(rhs, line),
            },
            Expr::Ternary(cond, then, otherwise) => {
                if is_truthy(&self.eval(cond, line)?) {
                    self.eval(then, line)
                } else {
                    self.eval(otherwise, line)
                }
            }
            Expr::Assign { target, op, value } => {
                let value = self.eval(value, line)?;
                let keys = self.resolve_path(target, line)?;
                let new = match op {
                    None => value,
                    Some(op) => {
                        let current = self.read_place(target, &keys, line)?;
                        binary(*op, &current, &value).map_err(fault)?
                    }
                };
                self.write_place(target, keys, new.clone(), line)?;
                Ok(new)
            }
            Expr::IncDec {
                target,
                delta,
                prefix,
            } => {
                let keys = self.resolve_path(target, line)?;
                let current = self.read_place(target, &keys, line)?;
                let new = binary(BinOp::Add, &current, &Value::from(*delta)).map_err(fault)?;
                self.write_place(target, keys, new.clone(), line)?;
                Ok(if *prefix { new } else { current })
            }
            Expr::Call(name, args) => self.call(name, args, line),
        }
    }

    /// Evaluate without faulting on missing variables, keys or properties.
    fn lookup(&mut self, expr: &Expr, line: usize) -> Result<Option<Value>, Fault> {
        match expr {
            Expr::At(line, inner) => self.lookup(inner, *line),
            Expr::Var(name) => Ok(self.scope.get(name).cloned()),
            Expr::Index(base, key) => {
                let Some(base) = self.lookup(base, line)? else {
                    return Ok(None);
                };
                let key = self.eval(key, line)?;
                Ok(index(&base, &key).ok())
            }
            Expr::Member(base, field) => {
                let Some(base) = self.lookup(base, line)? else {
                    return Ok(None);
                };
                Ok(member(&base, field).ok())
            }
            other => self.eval(other, line).map(Some),
        }
    }

    fn call(&mut self, name: &str, args: &[Expr], line: usize) -> Result<Value, Fault> {
        match name.to_ascii_lowercase().as_str() {
            "isset" => {
                if args.is_empty() {
                    return Err(Fault::new("isset() expects at least 1 argument", line));
                }
                for arg in args {
                    match self.lookup(arg, line)? {
                        Some(value) if !value.is_null() => {}
                        _ => return Ok(Value::Bool(false)),
                    }
                }
                Ok(Value::Bool(true))
            }
            "empty" => {
                let [arg] = args else {
                    return Err(Fault::new(
                        format!("empty() expects 1 argument(s), {} given", args.len()),
                        line,
                    ));
                };
                let value = self.lookup(arg, line)?;
                Ok(Value::Bool(!value.as_ref().is_some_and(is_truthy)))
            }
            _ => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg, line))
                    .collect::<Result<Vec<_>, _>>()?;
                match call_builtin(name, values) {
                    Some(result) => result.map_err(|message| Fault::new(message, line)),
                    None => Err(Fault::new(
                        format!("Call to undefined function {name}()"),
                        line,
                    )),
                }
            }
        }
    }

    // ── Places ───────────────────────────────────────────────────────────────

    fn resolve_path(&mut self, place: &Place, line: usize) -> Result<Vec<Key>, Fault> {
        place
            .path
            .iter()
            .map(|seg| match seg {
                PathSeg::Index(expr) => self.eval(expr, line).map(Key::Index),
                PathSeg::Member(field) => Ok(Key::Member(field.clone())),
                PathSeg::Append => Ok(Key::Append),
            })
            .collect()
    }

    fn read_place(&self, place: &Place, keys: &[Key], line: usize) -> Result<Value, Fault> {
        let mut current = self
            .scope
            .get(&place.name)
            .cloned()
            .ok_or_else(|| Fault::new(format!("Undefined variable ${}", place.name), line))?;
        for key in keys {
            current = match key {
                Key::Index(k) => index(&current, k),
                Key::Member(field) => member(&current, field),
                Key::Append => Err("Cannot use [] for reading".to_string()),
            }
            .map_err(|message| Fault::new(message, line))?;
        }
        Ok(current)
    }

    fn write_place(
        &mut self,
        place: &Place,
        keys: Vec<Key>,
        value: Value,
        line: usize,
    ) -> Result<(), Fault> {
        let mut slot = self.scope.entry(place.name.clone()).or_insert(Value::Null);
        for key in &keys {
            slot = descend(slot, key).map_err(|message| Fault::new(message, line))?;
        }
        *slot = value;
        Ok(())
    }
}

// ── Value access ─────────────────────────────────────────────────────────────

fn array_index(key: &Value) -> Option<usize> {
    match to_num(key)? {
        Num::Int(i) => usize::try_from(i).ok(),
        Num::Float(_) => None,
    }
}

fn key_string(key: &Value) -> String {
    to_output(key)
}

fn index(base: &Value, key: &Value) -> Result<Value, String> {
    match base {
        Value::Array(items) => array_index(key)
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| format!("Undefined array key {key}")),
        Value::Object(map) => {
            let name = key_string(key);
            map.get(&name)
                .cloned()
                .ok_or_else(|| format!("Undefined array key \"{name}\""))
        }
        Value::String(s) => array_index(key)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .ok_or_else(|| format!("Uninitialized string offset {key}")),
        other => Err(format!(
            "Trying to access array offset on value of type {}",
            type_name(other)
        )),
    }
}

fn member(base: &Value, field: &str) -> Result<Value, String> {
    match base {
        Value::Object(map) => map
            .get(field)
            .cloned()
            .ok_or_else(|| format!("Undefined property: {field}")),
        other => Err(format!(
            "Attempt to read property \"{field}\" on {}",
            type_name(other)
        )),
    }
}

/// Step one level into `slot` for writing, creating containers as needed.
fn descend<'v>(slot: &'v mut Value, key: &Key) -> Result<&'v mut Value, String> {
    if slot.is_null() {
        *slot = match key {
            Key::Append => Value::Array(Vec::new()),
            Key::Index(k) if array_index(k) == Some(0) => Value::Array(Vec::new()),
            _ => Value::Object(Map::new()),
        };
    }

    // An array written at a non-sequential key becomes a map.
    if let Key::Index(k) = key {
        let sequential = match &*slot {
            Value::Array(items) => array_index(k).is_some_and(|i| i <= items.len()),
            _ => true,
        };
        if !sequential {
            if let Value::Array(items) = std::mem::take(slot) {
                *slot = Value::Object(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v))
                        .collect(),
                );
            }
        }
    }

    match (slot, key) {
        (Value::Array(items), Key::Append) => {
            items.push(Value::Null);
            let last = items.len() - 1;
            Ok(&mut items[last])
        }
        (Value::Array(items), Key::Index(k)) => {
            let i = array_index(k)
                .filter(|&i| i < items.len())
                .unwrap_or_else(|| {
                    items.push(Value::Null);
                    items.len() - 1
                });
            Ok(&mut items[i])
        }
        (Value::Object(map), Key::Append) => {
            let next = map.len().to_string();
            Ok(map.entry(next).or_insert(Value::Null))
        }
        (Value::Object(map), Key::Index(k)) => Ok(map.entry(key_string(k)).or_insert(Value::Null)),
        (Value::Object(map), Key::Member(field)) => {
            Ok(map.entry(field.clone()).or_insert(Value::Null))
        }
        (other, Key::Member(field)) => Err(format!(
            "Attempt to assign property \"{field}\" on {}",
            type_name(other)
        )),
        (other, _) => Err(format!(
            "Cannot use a scalar value of type {} as an array",
            type_name(other)
        )),
    }
}

// ── Operators ────────────────────────────────────────────────────────────────

fn negate(value: &Value) -> Result<Value, String> {
    match to_num(value) {
        Some(Num::Int(n)) => n
            .checked_neg()
            .map(Num::Int)
            .unwrap_or(Num::Float(-(n as f64)))
            .into_value(),
        Some(Num::Float(x)) => Num::Float(-x).into_value(),
        None => Err(format!("Unsupported operand types: -{}", type_name(value))),
    }
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, String> {
    match op {
        BinOp::Concat => Ok(Value::String(to_output(a) + &to_output(b))),
        BinOp::Eq => Ok(Value::Bool(loose_eq(a, b))),
        BinOp::Ne => Ok(Value::Bool(!loose_eq(a, b))),
        BinOp::Identical => Ok(Value::Bool(a == b)),
        BinOp::NotIdentical => Ok(Value::Bool(a != b)),
        BinOp::Lt => compare(a, b).map(|o| Value::Bool(o.is_lt())),
        BinOp::Le => compare(a, b).map(|o| Value::Bool(o.is_le())),
        BinOp::Gt => compare(a, b).map(|o| Value::Bool(o.is_gt())),
        BinOp::Ge => compare(a, b).map(|o| Value::Bool(o.is_ge())),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arith(op, a, b),
    }
}

fn arith(op: BinOp, a: &Value, b: &Value) -> Result<Value, String> {
    let (Some(x), Some(y)) = (to_num(a), to_num(b)) else {
        return Err(format!(
            "Unsupported operand types: {} {} {}",
            type_name(a),
            op.symbol(),
            type_name(b)
        ));
    };

    let result = match (op, x, y) {
        (BinOp::Rem, _, _) => {
            let divisor = y.as_i64();
            if divisor == 0 {
                return Err("Modulo by zero".to_string());
            }
            Num::Int(x.as_i64().wrapping_rem(divisor))
        }
        (BinOp::Div, _, _) => {
            if y.as_f64() == 0.0 {
                return Err("Division by zero".to_string());
            }
            match (x, y) {
                (Num::Int(p), Num::Int(q)) if p.checked_rem(q) == Some(0) => {
                    p.checked_div(q).map_or(Num::Float(p as f64 / q as f64), Num::Int)
                }
                _ => Num::Float(x.as_f64() / y.as_f64()),
            }
        }
        (BinOp::Add, Num::Int(p), Num::Int(q)) => {
            p.checked_add(q).map_or(Num::Float(p as f64 + q as f64), Num::Int)
        }
        (BinOp::Sub, Num::Int(p), Num::Int(q)) => {
            p.checked_sub(q).map_or(Num::Float(p as f64 - q as f64), Num::Int)
        }
        (BinOp::Mul, Num::Int(p), Num::Int(q)) => {
            p.checked_mul(q).map_or(Num::Float(p as f64 * q as f64), Num::Int)
        }
        (BinOp::Add, _, _) => Num::Float(x.as_f64() + y.as_f64()),
        (BinOp::Sub, _, _) => Num::Float(x.as_f64() - y.as_f64()),
        (BinOp::Mul, _, _) => Num::Float(x.as_f64() * y.as_f64()),
        _ => return Err(format!("Unsupported arithmetic operator {}", op.symbol())),
    };
    result.into_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::compile;
    use serde_json::json;

    fn render(src: &str, vars: Value) -> Result<String, Fault> {
        let program = compile(src)?;
        let scope = match vars {
            Value::Object(map) => map.into_iter().collect(),
            _ => Scope::new(),
        };
        run(&program, scope)
    }

    #[test]
    fn test_echo_variable() {
        let out = render("Hello <?tpl= $name ?>!", json!({"name": "World"})).unwrap();
        assert_eq!(out, "Hello World!");
    }

    #[test]
    fn test_for_loop() {
        let out = render("<?tpl for (i=0;i<3;i++): ?><?tpl= i ?>,<?tpl end ?>", json!({})).unwrap();
        assert_eq!(out, "0,1,2,");
    }

    #[test]
    fn test_foreach_rows() {
        let vars = json!({"products": [
            {"id": 1, "name": "Pen"},
            {"id": 2, "name": "Ink"},
        ]});
        let src = "<?tpl foreach ($products as $p): ?>[<?tpl= $p['id'] ?>:<?tpl= $p->name ?>]<?tpl endforeach ?>";
        assert_eq!(render(src, vars).unwrap(), "[1:Pen][2:Ink]");
    }

    #[test]
    fn test_foreach_keys_follow_insertion_order() {
        let vars = json!({"user": {"name": "Ann", "email": "ann@example.com", "id": 7}});
        let src = "<?tpl foreach $user as $k => $v { ?><?tpl= $k ?>=<?tpl= $v ?>;<?tpl } ?>";
        assert_eq!(render(src, vars).unwrap(), "name=Ann;email=ann@example.com;id=7;");
    }

    #[test]
    fn test_if_chains() {
        let src = "<?tpl if ($n > 10): ?>big<?tpl elseif ($n > 5): ?>mid<?tpl else: ?>small<?tpl endif ?>";
        assert_eq!(render(src, json!({"n": 20})).unwrap(), "big");
        assert_eq!(render(src, json!({"n": 7})).unwrap(), "mid");
        assert_eq!(render(src, json!({"n": 1})).unwrap(), "small");
    }

    #[test]
    fn test_brace_if() {
        assert_eq!(render("<?tpl if (true) { ?>X<?tpl } ?>", json!({})).unwrap(), "X");
        assert_eq!(render("<?tpl if (false) { ?>X<?tpl } ?>", json!({})).unwrap(), "");
    }

    #[test]
    fn test_while_break_continue() {
        let src = "<?tpl $i = 0; while ($i < 10) { $i++; if ($i % 2 == 0) { continue; } if ($i > 7) { break; } echo $i; } ?>";
        assert_eq!(render(src, json!({})).unwrap(), "1357");
    }

    #[test]
    fn test_assignments_do_not_need_prior_container() {
        let src = "<?tpl $list[] = 'a'; $list[] = 'b'; $map['x']['y'] = 1; $map['x']['y'] += 2; ?><?tpl= json($list) ?> <?tpl= json($map) ?>";
        assert_eq!(render(src, json!({})).unwrap(), r#"["a","b"] {"x":{"y":3}}"#);
    }

    #[test]
    fn test_operators() {
        assert_eq!(render("<?tpl= 7 / 2 ?>", json!({})).unwrap(), "3.5");
        assert_eq!(render("<?tpl= 6 / 2 ?>", json!({})).unwrap(), "3");
        assert_eq!(render("<?tpl= 'a' . 1 + 2 ?>", json!({})).unwrap(), "a3");
        assert_eq!(render("<?tpl= -$x * 2 ?>", json!({"x": 4})).unwrap(), "-8");
        assert_eq!(render("<?tpl= $a ?? 'none' ?>", json!({})).unwrap(), "none");
        assert_eq!(render("<?tpl= $u['missing'] ?? 'd' ?>", json!({"u": {}})).unwrap(), "d");
        assert_eq!(render("<?tpl= 1 == '1' ? 'y' : 'n' ?>", json!({})).unwrap(), "y");
        assert_eq!(render("<?tpl= 1 === '1' ? 'y' : 'n' ?>", json!({})).unwrap(), "n");
        assert_eq!(render("<?tpl= isset($a, $b) ?>|<?tpl= empty($c) ?>", json!({"a": 1, "b": 2})).unwrap(), "1|1");
    }

    #[test]
    fn test_scope_copy_is_local() {
        let program = compile("<?tpl $x = 2 ?><?tpl= $x ?>").unwrap();
        let mut scope = Scope::new();
        scope.insert("x".to_string(), json!(1));
        assert_eq!(run(&program, scope.clone()).unwrap(), "2");
        assert_eq!(scope["x"], json!(1));
    }

    #[test]
    fn test_runtime_faults_carry_lines() {
        let fault = render("line1\nline2 <?tpl= $missing ?>", json!({})).unwrap_err();
        assert_eq!(fault.message, "Undefined variable $missing");
        assert_eq!(fault.line, 2);

        let fault = render("<?tpl\n\n$x = 1 / 0 ?>", json!({})).unwrap_err();
        assert_eq!(fault.message, "Division by zero");
        assert_eq!(fault.line, 3);

        assert!(render("<?tpl= nope() ?>", json!({})).is_err());
        assert!(render("<?tpl= 'a' * 2 ?>", json!({})).is_err());
        assert!(render("<?tpl foreach (5 as $x): ?><?tpl end ?>", json!({})).is_err());
        assert!(render("<?tpl break ?>", json!({})).is_err());
        assert!(render("<?tpl= $list[5] ?>", json!({"list": [1]})).is_err());
    }

    #[test]
    fn test_faults_inside_multiline_expressions() {
        let fault = render("<?tpl= 'a' .\n'b' .\n$missing ?>", json!({})).unwrap_err();
        assert_eq!(fault.message, "Undefined variable $missing");
        assert_eq!(fault.line, 3);

        let fault = render("<?tpl $total = $n\n  / $zero ?>", json!({"n": 1, "zero": 0}))
            .unwrap_err();
        assert_eq!(fault.message, "Division by zero");
        assert_eq!(fault.line, 2);

        let fault = render(
            "<?tpl= count(\n  $rows,\n  $extra\n) ?>",
            json!({"rows": [], "extra": 1}),
        )
        .unwrap_err();
        assert!(fault.message.starts_with("count()"), "{}", fault.message);
        assert_eq!(fault.line, 1);

        let fault = render("<?tpl= $user\n->name ?>", json!({"user": {}})).unwrap_err();
        assert_eq!(fault.line, 2);
    }
}
