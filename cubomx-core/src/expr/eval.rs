//! Tree-walking evaluator.

use tracing::trace;

use super::parser::{AssignOp, BinaryOp, Expr, LogicalOp, UnaryOp};
use super::Scope;
use crate::dom::{Event, NodeId};
use crate::error::{Error, Result};
use crate::reactive::{ClassList, ItemCollection, Proxy};
use crate::value::{CallContext, Record, Value};

pub(super) struct Evaluator<'a> {
    scope: &'a Scope,
}

impl<'a> Evaluator<'a> {
    pub(super) fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    pub(super) fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => {
                let items = items.iter().map(|e| self.eval(e)).collect::<Result<Vec<_>>>()?;
                Ok(Value::array(items))
            }
            Expr::Object(entries) => {
                let mut record = Record::new();
                for (key, value) in entries {
                    record.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::object(record))
            }
            Expr::Ident(name) => Ok(self.lookup(name)),
            Expr::This => Ok(self.scope.this.clone().map(Value::Proxy).unwrap_or_default()),
            Expr::Member(object, name) => {
                let object = self.eval(object)?;
                self.member(&object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.index(&object, &index)
            }
            Expr::Call(callee, args) => self.call(callee, args),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                Ok(binary(*op, &lhs, &rhs))
            }
            Expr::Logical(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let short = match op {
                    LogicalOp::And => !lhs.is_truthy(),
                    LogicalOp::Or => lhs.is_truthy(),
                    LogicalOp::Coalesce => !lhs.is_nullish(),
                };
                if short {
                    Ok(lhs)
                } else {
                    self.eval(rhs)
                }
            }
            Expr::Conditional(test, then, otherwise) => {
                if self.eval(test)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign(op, target, value) => {
                let value = match op {
                    AssignOp::Set => self.eval(value)?,
                    AssignOp::Add => binary(BinaryOp::Add, &self.eval(target)?, &self.eval(value)?),
                    AssignOp::Sub => binary(BinaryOp::Sub, &self.eval(target)?, &self.eval(value)?),
                };
                self.assign(target, value.clone())?;
                Ok(value)
            }
            Expr::Update {
                target,
                delta,
                prefix,
            } => {
                let old = self.eval(target)?.to_number();
                let new = old + delta;
                self.assign(target, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
        }
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    fn lookup(&self, name: &str) -> Value {
        let scope = self.scope;
        match name {
            "$el" => return scope.element.map(Value::Element).unwrap_or_default(),
            "$event" => return scope.event.clone().map(Value::Event).unwrap_or_default(),
            "$item" => return scope.item.clone().map(Value::Proxy).unwrap_or_default(),
            "$watch" => return scope.this.as_ref().map(|p| p.get("$watch")).unwrap_or_default(),
            _ => {}
        }
        if name == scope.runtime.config().global_name {
            return self.namespace();
        }
        if let Some(instance) = name.strip_prefix('$').and_then(|n| scope.runtime.instance(n)) {
            return Value::Proxy(instance);
        }
        [scope.this.as_ref(), scope.item.as_ref()]
            .into_iter()
            .flatten()
            .find(|proxy| proxy.has(name))
            .map(|proxy| proxy.get(name))
            .unwrap_or_default()
    }

    /// The global namespace: every live store and component by name.
    fn namespace(&self) -> Value {
        let runtime = &self.scope.runtime;
        let record: Record = runtime
            .instance_names()
            .into_iter()
            .filter_map(|name| runtime.instance(&name).map(|p| (name, Value::Proxy(p))))
            .collect();
        Value::object(record)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    fn member(&self, object: &Value, name: &str) -> Result<Value> {
        Ok(match object {
            Value::Undefined | Value::Null => {
                return Err(Error::eval(format!(
                    "cannot read `{name}` of {}",
                    object.type_name()
                )))
            }
            Value::Proxy(proxy) => proxy.get(name),
            Value::Object(record) => record.get(name).cloned().unwrap_or_default(),
            Value::String(s) if name == "length" => Value::from(s.chars().count()),
            Value::Array(items) if name == "length" => Value::from(items.len()),
            Value::ClassList(list) if name == "length" => Value::from(list.len()),
            Value::Collection(items) if name == "length" => Value::from(items.len()),
            Value::Element(node) => self.element_property(*node, name),
            Value::Event(event) => event_property(event, name),
            _ => Value::Undefined,
        })
    }

    fn element_property(&self, node: NodeId, name: &str) -> Value {
        let document = self.scope.runtime.document();
        match name {
            "value" => Value::from(document.value(node)),
            "checked" => Value::Bool(document.checked(node)),
            "textContent" => Value::from(document.text_content(node)),
            "innerHTML" => Value::from(document.inner_html(node)),
            "tagName" => document
                .tag_name(node)
                .map(|t| Value::from(t.to_ascii_uppercase()))
                .unwrap_or_default(),
            "id" => Value::from(document.attribute(node, "id").unwrap_or_default()),
            "className" => Value::from(document.class_names(node).join(" ")),
            "parentElement" => document.parent(node).filter(|p| document.is_element(*p)).into(),
            _ => Value::Undefined,
        }
    }

    fn index(&self, object: &Value, index: &Value) -> Result<Value> {
        Ok(match object {
            Value::Array(items) => position(index)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default(),
            Value::String(s) => position(index)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::from(c.to_string()))
                .unwrap_or_default(),
            Value::Collection(items) => position(index)
                .and_then(|i| items.get(i))
                .map(Value::Proxy)
                .unwrap_or_default(),
            _ => return self.member(object, &index.to_display_string()),
        })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    fn assign(&self, target: &Expr, value: Value) -> Result<()> {
        match target {
            Expr::Ident(name) => self.assign_name(name, value),
            Expr::Member(object, name) => {
                let object = self.eval(object)?;
                self.set_member(&object, name, value)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let key = self.eval(index)?.to_display_string();
                self.set_member(&object, &key, value)
            }
            _ => Err(Error::eval("invalid assignment target")),
        }
    }

    /// Bare names write to the instance that already has the property,
    /// falling back to `this`.
    fn assign_name(&self, name: &str, value: Value) -> Result<()> {
        if name.starts_with('$') {
            return Err(Error::eval(format!("cannot assign to `{name}`")));
        }
        let scope = self.scope;
        let target = scope
            .this
            .as_ref()
            .filter(|p| p.has(name))
            .or_else(|| scope.item.as_ref().filter(|p| p.has(name)))
            .or(scope.this.as_ref())
            .or(scope.item.as_ref())
            .ok_or_else(|| Error::eval(format!("no instance to assign `{name}` on")))?;
        target.set(name, value);
        Ok(())
    }

    fn set_member(&self, object: &Value, name: &str, value: Value) -> Result<()> {
        let document = self.scope.runtime.document();
        match object {
            Value::Proxy(proxy) => {
                proxy.set(name, value);
            }
            Value::Element(node) => match name {
                "value" => document.set_value(*node, &value.to_display_string()),
                "checked" => document.set_checked(*node, value.is_truthy()),
                "textContent" => document.set_text_content(*node, &value.to_display_string()),
                "innerHTML" => document.set_inner_html(*node, &value.to_display_string()),
                "className" => document.set_class_name(*node, &value.to_display_string()),
                _ => return Err(Error::eval(format!("cannot assign `{name}` on an element"))),
            },
            _ => {
                return Err(Error::eval(format!(
                    "cannot assign `{name}` on {}",
                    object.type_name()
                )))
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn call(&self, callee: &Expr, args: &[Expr]) -> Result<Value> {
        let (receiver, method) = match callee {
            Expr::Member(object, name) => (self.eval(object)?, name.clone()),
            Expr::Index(object, index) => {
                let receiver = self.eval(object)?;
                (receiver, self.eval(index)?.to_display_string())
            }
            _ => {
                let function = self.eval(callee)?;
                let args = self.eval_args(args)?;
                return self.call_function(&function, self.scope.this.as_ref(), &args);
            }
        };
        let args = self.eval_args(args)?;
        trace!(method = %method, receiver = receiver.type_name(), "calling method");
        self.call_method(&receiver, &method, &args)
    }

    fn eval_args(&self, args: &[Expr]) -> Result<Vec<Value>> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn call_function(&self, function: &Value, this: Option<&Proxy>, args: &[Value]) -> Result<Value> {
        let Value::Function(function) = function else {
            return Err(Error::eval(format!("{} is not a function", function.type_name())));
        };
        let cx = CallContext {
            runtime: &self.scope.runtime,
            this,
        };
        function.call(&cx, args)
    }

    fn call_method(&self, receiver: &Value, method: &str, args: &[Value]) -> Result<Value> {
        match receiver {
            Value::Proxy(proxy) => self.call_function(&proxy.get(method), Some(proxy), args),
            Value::Object(record) => {
                let function = record.get(method).cloned().unwrap_or_default();
                self.call_function(&function, self.scope.this.as_ref(), args)
            }
            Value::String(s) => string_method(s, method, args),
            Value::Array(items) => array_method(items, method, args),
            Value::Element(node) => self.element_method(*node, method, args),
            Value::Event(event) => event_method(event, method),
            Value::ClassList(list) => class_list_method(list, method, args),
            Value::Collection(items) => collection_method(items, method, args),
            _ => Err(Error::eval(format!(
                "{}.{method} is not a function",
                receiver.type_name()
            ))),
        }
    }

    fn element_method(&self, node: NodeId, method: &str, args: &[Value]) -> Result<Value> {
        let document = self.scope.runtime.document();
        let name = arg(args, 0).to_display_string();
        match method {
            "getAttribute" => Ok(document.attribute(node, &name).into()),
            "hasAttribute" => Ok(Value::Bool(document.has_attribute(node, &name))),
            "setAttribute" => {
                document.set_attribute(node, &name, &arg(args, 1).to_display_string());
                Ok(Value::Undefined)
            }
            "removeAttribute" => {
                document.remove_attribute(node, &name);
                Ok(Value::Undefined)
            }
            _ => Err(Error::eval(format!("element.{method} is not a function"))),
        }
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// A non-negative integer index, if `value` is one.
fn position(value: &Value) -> Option<usize> {
    let n = value.to_number();
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn event_property(event: &Event, name: &str) -> Value {
    match name {
        "type" => Value::from(event.kind()),
        "target" => event.target().into(),
        "defaultPrevented" => Value::Bool(event.default_prevented()),
        _ => Value::Undefined,
    }
}

fn string_method(s: &str, method: &str, args: &[Value]) -> Result<Value> {
    Ok(match method {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "includes" => Value::Bool(s.contains(arg(args, 0).to_display_string().as_str())),
        "startsWith" => Value::Bool(s.starts_with(arg(args, 0).to_display_string().as_str())),
        "toString" => Value::from(s),
        _ => return Err(Error::eval(format!("string.{method} is not a function"))),
    })
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> Result<Value> {
    Ok(match method {
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(items.iter().any(|item| item.strict_eq(&needle)))
        }
        "join" => {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(sep) => sep.to_display_string(),
            };
            Value::from(
                items
                    .iter()
                    .map(Value::to_display_string)
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        _ => return Err(Error::eval(format!("array.{method} is not a function"))),
    })
}

fn event_method(event: &Event, method: &str) -> Result<Value> {
    match method {
        "preventDefault" => event.prevent_default(),
        "stopPropagation" => event.stop_propagation(),
        _ => return Err(Error::eval(format!("event.{method} is not a function"))),
    }
    Ok(Value::Undefined)
}

fn class_list_method(list: &ClassList, method: &str, args: &[Value]) -> Result<Value> {
    let names = args.iter().map(Value::to_display_string);
    Ok(match method {
        "add" => {
            names.for_each(|n| list.add(&n));
            Value::Undefined
        }
        "remove" => {
            names.for_each(|n| list.remove(&n));
            Value::Undefined
        }
        "toggle" => Value::Bool(list.toggle(&arg(args, 0).to_display_string())),
        "contains" => Value::Bool(list.contains(&arg(args, 0).to_display_string())),
        _ => return Err(Error::eval(format!("classList.{method} is not a function"))),
    })
}

/// Collection mutations are fire-and-forget from expressions; the
/// completion is dropped and hydration happens at the next checkpoint.
fn collection_method(items: &ItemCollection, method: &str, args: &[Value]) -> Result<Value> {
    let index = || position(&arg(args, 0)).unwrap_or(usize::MAX);
    let completion = match method {
        "get" => return Ok(items.get(index()).map(Value::Proxy).unwrap_or_default()),
        "add" => items.add(record_arg(args, 0)?),
        "prepend" => items.prepend(record_arg(args, 0)?),
        "insert" => {
            let at = position(&arg(args, 1)).unwrap_or(usize::MAX);
            items.insert(record_arg(args, 0)?, at)
        }
        "replace" => items.replace(index(), record_arg(args, 1)?),
        "delete" => items.delete(index()),
        "remove" => match args.first() {
            Some(Value::Proxy(proxy)) => items.remove(proxy),
            _ => return Err(Error::eval("collection.remove expects an item")),
        },
        "pop" => items.pop(),
        "shift" => items.shift(),
        "clear" => items.clear(),
        _ => return Err(Error::eval(format!("collection.{method} is not a function"))),
    };
    drop(completion);
    Ok(Value::Undefined)
}

fn record_arg(args: &[Value], index: usize) -> Result<Record> {
    match args.get(index) {
        Some(Value::Object(record)) => Ok(record.as_ref().clone()),
        Some(Value::Proxy(proxy)) => Ok(proxy.snapshot()),
        None | Some(Value::Undefined) => Ok(Record::new()),
        Some(other) => Err(Error::eval(format!(
            "expected an object, got {}",
            other.type_name()
        ))),
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(
        value,
        Value::Number(_) | Value::Bool(_) | Value::Null | Value::Undefined
    )
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    use std::cmp::Ordering;

    let compare = || match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => lhs.to_number().partial_cmp(&rhs.to_number()),
    };
    match op {
        BinaryOp::Add if is_numeric(lhs) && is_numeric(rhs) => {
            Value::Number(lhs.to_number() + rhs.to_number())
        }
        BinaryOp::Add => Value::from(format!("{lhs}{rhs}")),
        BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
        BinaryOp::Lt => Value::Bool(compare() == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(compare(), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Gt => Value::Bool(compare() == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(compare(), Some(Ordering::Greater | Ordering::Equal))),
        BinaryOp::LooseEq => Value::Bool(lhs.loose_eq(rhs)),
        BinaryOp::LooseNe => Value::Bool(!lhs.loose_eq(rhs)),
        BinaryOp::StrictEq => Value::Bool(lhs.strict_eq(rhs)),
        BinaryOp::StrictNe => Value::Bool(!lhs.strict_eq(rhs)),
    }
}
