//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Expression language and cycle logic programs."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::collections::HashMap;

use crate::parser::{BinaryOp, Expr, UnaryOp};
use crate::value::Value;

/// Evaluate an expression against the environment.
///
/// The environment holds tag snapshots and earlier assignment results.
/// Built-ins (`sin`, `cos`, `sqrt`, `abs`, `sprintf`) are dispatched by
/// name and shadow nothing: a tag named like a built-in is still readable
/// as an identifier.
pub(crate) fn evaluate(expr: &Expr, env: &HashMap<String, Value>) -> Result<Value, String> {
    match expr {
        Expr::Number(n) => Ok(Value::Num(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Ident(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unknown identifier '{name}'")),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, env)?;
            match op {
                UnaryOp::Neg => match value {
                    Value::Num(n) => Ok(Value::Num(-n)),
                    other => Err(format!("cannot negate a {}", other.kind())),
                },
                UnaryOp::Not => match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(format!("cannot logically negate a {}", other.kind())),
                },
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            // Short-circuit the logical operators before touching the rhs.
            if matches!(op, BinaryOp::And | BinaryOp::Or) {
                return logical(*op, lhs, rhs, env);
            }

            let left = evaluate(lhs, env)?;
            let right = evaluate(rhs, env)?;
            binary(*op, left, right)
        }
        Expr::Ternary { cond, then, other } => match evaluate(cond, env)? {
            Value::Bool(true) => evaluate(then, env),
            Value::Bool(false) => evaluate(other, env),
            value => Err(format!("ternary condition is a {}, not a bool", value.kind())),
        },
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, env)?);
            }
            call(name, &values)
        }
    }
}

fn logical(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    env: &HashMap<String, Value>,
) -> Result<Value, String> {
    let Value::Bool(left) = evaluate(lhs, env)? else {
        return Err("logical operand is not a bool".to_owned());
    };

    let short_circuit = match op {
        BinaryOp::And => !left,
        _ => left,
    };
    if short_circuit {
        return Ok(Value::Bool(left));
    }

    match evaluate(rhs, env)? {
        Value::Bool(right) => Ok(Value::Bool(right)),
        other => Err(format!("logical operand is a {}, not a bool", other.kind())),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, String> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Add => {
            // String concatenation is the one non-numeric use of '+'.
            if let (Value::Str(l), Value::Str(r)) = (&left, &right) {
                return Ok(Value::Str(format!("{l}{r}")));
            }
            numeric(op, left, right)
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem | BinaryOp::Pow => {
            numeric(op, left, right)
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (l, r) = numbers(op, left, right)?;
            let result = match op {
                BinaryOp::Lt => l < r,
                BinaryOp::Le => l <= r,
                BinaryOp::Gt => l > r,
                _ => l >= r,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled with short-circuiting"),
    }
}

fn numeric(op: BinaryOp, left: Value, right: Value) -> Result<Value, String> {
    let (l, r) = numbers(op, left, right)?;
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Rem => l % r,
        BinaryOp::Pow => l.powf(r),
        _ => unreachable!("comparison handled by caller"),
    };
    Ok(Value::Num(result))
}

fn numbers(op: BinaryOp, left: Value, right: Value) -> Result<(f64, f64), String> {
    match (left, right) {
        (Value::Num(l), Value::Num(r)) => Ok((l, r)),
        (l, r) => Err(format!(
            "operator {op:?} needs numeric operands, got {} and {}",
            l.kind(),
            r.kind()
        )),
    }
}

fn call(name: &str, args: &[Value]) -> Result<Value, String> {
    match name {
        "sin" => unary_math(name, args, f64::sin),
        "cos" => unary_math(name, args, f64::cos),
        "sqrt" => unary_math(name, args, f64::sqrt),
        "abs" => unary_math(name, args, f64::abs),
        "sprintf" => {
            let Some((Value::Str(format), rest)) = args.split_first() else {
                return Err("sprintf needs a format string".to_owned());
            };
            sprintf(format, rest).map(Value::Str)
        }
        other => Err(format!("unknown function '{other}'")),
    }
}

fn unary_math(name: &str, args: &[Value], f: impl Fn(f64) -> f64) -> Result<Value, String> {
    match args {
        [Value::Num(n)] => Ok(Value::Num(f(*n))),
        [other] => Err(format!("{name} needs a number, got a {}", other.kind())),
        _ => Err(format!("{name} takes exactly one argument")),
    }
}

/// Minimal Go-style formatter: `%v`, `%f`, `%d`, `%s`, `%t`, `%%`, with
/// optional width and precision for `%f`.
fn sprintf(format: &str, args: &[Value]) -> Result<String, String> {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut next = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut width = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() {
                width.push(d);
                chars.next();
            } else {
                break;
            }
        }

        let mut precision = String::new();
        if chars.peek() == Some(&'.') {
            chars.next();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    precision.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
        }

        let verb = chars.next().ok_or("format string ends inside a verb")?;
        let arg = next.next().ok_or_else(|| format!("missing argument for %{verb}"))?;

        let rendered = match verb {
            'v' => arg.to_string(),
            's' => match arg {
                Value::Str(s) => s.clone(),
                other => other.to_string(),
            },
            't' => match arg {
                Value::Bool(b) => b.to_string(),
                other => return Err(format!("%t needs a bool, got a {}", other.kind())),
            },
            'd' => {
                let n = arg
                    .coerce_num()
                    .ok_or_else(|| format!("%d needs a number, got a {}", arg.kind()))?;
                format!("{}", n as i64)
            }
            'f' => {
                let n = arg
                    .coerce_num()
                    .ok_or_else(|| format!("%f needs a number, got a {}", arg.kind()))?;
                let precision: usize = precision.parse().unwrap_or(6);
                format!("{n:.precision$}")
            }
            other => return Err(format!("unsupported format verb %{other}")),
        };

        let width: usize = width.parse().unwrap_or(0);
        if rendered.len() < width {
            for _ in 0..width - rendered.len() {
                out.push(' ');
            }
        }
        out.push_str(&rendered);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Expr;

    fn eval(source: &str, env: &HashMap<String, Value>) -> Result<Value, String> {
        evaluate(&Expr::parse(source).unwrap(), env)
    }

    fn env(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    #[test]
    fn arithmetic_follows_ieee_doubles() {
        let env = HashMap::new();
        assert_eq!(eval("1 + 2 * 3", &env), Ok(Value::Num(7.0)));
        assert_eq!(eval("2 ** 3 ** 2", &env), Ok(Value::Num(512.0)));
        assert_eq!(eval("7 % 3", &env), Ok(Value::Num(1.0)));
        assert_eq!(eval("1 / 0", &env), Ok(Value::Num(f64::INFINITY)));
    }

    #[test]
    fn identifiers_come_from_the_environment() {
        let env = env(&[("mw", Value::Num(75.0)), ("on", Value::Bool(true))]);
        assert_eq!(eval("mw / 3", &env), Ok(Value::Num(25.0)));
        assert_eq!(eval("on ? mw : 0", &env), Ok(Value::Num(75.0)));
        assert!(eval("missing + 1", &env).is_err());
    }

    #[test]
    fn ternary_requires_a_boolean_condition() {
        let env = env(&[("x", Value::Num(1.0))]);
        assert!(eval("x ? 1 : 2", &env).is_err());
        assert_eq!(eval("x > 0 ? 1 : 2", &env), Ok(Value::Num(1.0)));
    }

    #[test]
    fn arithmetic_on_booleans_is_an_error() {
        let env = env(&[("on", Value::Bool(true))]);
        assert!(eval("on + 1", &env).is_err());
        assert!(eval("-on", &env).is_err());
    }

    #[test]
    fn logical_operators_short_circuit() {
        let env = env(&[("off", Value::Bool(false))]);
        // The rhs would fail if evaluated.
        assert_eq!(eval("off && missing", &env), Ok(Value::Bool(false)));
        assert_eq!(eval("!off || missing", &env), Ok(Value::Bool(true)));
    }

    #[test]
    fn sin_is_radians() {
        let env = HashMap::new();
        let Ok(Value::Num(v)) = eval("sin(1.5707963267948966)", &env) else {
            panic!("expected a number");
        };
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sprintf_supports_go_style_verbs() {
        assert_eq!(
            sprintf("MW: %f", &[Value::Num(75.0)]).unwrap(),
            "MW: 75.000000"
        );
        assert_eq!(
            sprintf("%.2f pct", &[Value::Num(12.345)]).unwrap(),
            "12.35 pct"
        );
        assert_eq!(
            sprintf("%s=%v (%t)", &[Value::from("Hz"), Value::Num(60.0), Value::Bool(true)])
                .unwrap(),
            "Hz=60 (true)"
        );
        assert_eq!(sprintf("%d%%", &[Value::Num(50.0)]).unwrap(), "50%");
        assert!(sprintf("%f", &[]).is_err());
        assert!(sprintf("%q", &[Value::Num(1.0)]).is_err());
    }

    #[test]
    fn string_concatenation_uses_plus() {
        let env = HashMap::new();
        assert_eq!(eval("'a' + 'b'", &env), Ok(Value::Str("ab".to_owned())));
        assert!(eval("'a' - 'b'", &env).is_err());
    }
}
