use std::fmt;

use async_trait::async_trait;
use evalexpr::{build_operator_tree, Node, Operator, Value as ExprValue};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{parse_arguments, Tool, ToolError};

const FUNCTIONS: [&str; 19] = [
    "sin", "cos", "tan", "arcsin", "arccos", "arctan", "arctan2", "sinh", "cosh", "tanh", "sqrt",
    "exp", "log", "log10", "log1p", "expm1", "abs", "floor", "ceil",
];

#[derive(Clone, Copy, Debug, Default)]
pub struct CalculatorTool;

#[derive(Debug, Deserialize)]
struct CalculatorArgs {
    expression: String,
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "Calculator"
    }

    fn description(&self) -> &'static str {
        "Calculates a math expression. Useful for when you need to answer questions about math. \
         This tool is only for math questions and nothing else. Only input math expressions."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "A valid numerical expression, e.g. `2 ** 10` or `sqrt(16) / 3`."
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: CalculatorArgs = parse_arguments(self.name(), arguments)?;
        evaluate(&args.expression).map(|number| Value::String(number.to_string()))
    }
}

/// Evaluates an arithmetic expression without executing any code. Parsing is
/// delegated to evalexpr; the arithmetic follows Python number rules.
pub fn evaluate(expression: &str) -> Result<Number, ToolError> {
    let calculator_error =
        |cause: String| ToolError::Calculator { expression: expression.to_string(), cause };

    let (rewritten, floor_divisions) = rewrite(expression.trim()).map_err(calculator_error)?;
    let tree = build_operator_tree(&rewritten)
        .map_err(|error| calculator_error(error.to_string()))?;
    Evaluator { floor_divisions, next_division: 0 }.eval(&tree).map_err(calculator_error)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) if value.is_nan() => f.write_str("nan"),
            Self::Float(value) if value.is_infinite() => {
                f.write_str(if value > 0.0 { "inf" } else { "-inf" })
            }
            Self::Float(value) => {
                let magnitude = value.abs();
                if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
                    write!(f, "{value:e}")
                } else if value.fract() == 0.0 {
                    write!(f, "{value:.1}")
                } else {
                    write!(f, "{value}")
                }
            }
        }
    }
}

const MAX_EXPRESSION_LEN: usize = 256;
const MAX_NESTING_DEPTH: usize = 32;

/// Rewrites Python operators into evalexpr's grammar and bounds the input.
///
/// `**` becomes `^` and unary `+` is dropped. Both `/` and `//` become `/`; the
/// returned flags record, per `/` in source order, whether it was a floor division.
fn rewrite(expression: &str) -> Result<(String, Vec<bool>), String> {
    if expression.chars().count() > MAX_EXPRESSION_LEN {
        return Err(format!("expression is longer than {MAX_EXPRESSION_LEN} characters"));
    }

    let mut output = String::with_capacity(expression.len());
    let mut floor_divisions = Vec::new();
    let mut depth = 0usize;
    let mut expect_operand = true;
    let mut chars = expression.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '*' if chars.next_if_eq(&'*').is_some() => {
                output.push('^');
                expect_operand = true;
            }
            '/' => {
                floor_divisions.push(chars.next_if_eq(&'/').is_some());
                output.push('/');
                expect_operand = true;
            }
            '+' if expect_operand => {}
            '+' | '-' | '*' | '%' | ',' => {
                output.push(ch);
                expect_operand = true;
            }
            '(' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err(format!("expression is nested deeper than {MAX_NESTING_DEPTH} levels"));
                }
                output.push(ch);
                expect_operand = true;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                output.push(ch);
                expect_operand = false;
            }
            ch if ch.is_whitespace() => output.push(' '),
            ch if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' => {
                output.push(ch);
                expect_operand = false;
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }

    Ok((output, floor_divisions))
}

/// Walks an evalexpr operator tree with Python number semantics.
struct Evaluator {
    floor_divisions: Vec<bool>,
    next_division: usize,
}

impl Evaluator {
    fn eval(&mut self, node: &Node) -> Result<Number, String> {
        let children = node.children();
        match node.operator() {
            Operator::RootNode => match children {
                [inner] => self.eval(inner),
                [] => Err("empty expression".to_string()),
                _ => Err("unexpected token `,`".to_string()),
            },
            Operator::Const { value } => constant(value),
            Operator::VariableIdentifierRead { identifier } => match identifier.as_str() {
                "pi" => Ok(Number::Float(std::f64::consts::PI)),
                "e" => Ok(Number::Float(std::f64::consts::E)),
                _ => Err(format!("unknown name `{identifier}`")),
            },
            Operator::FunctionIdentifier { identifier } => {
                if !FUNCTIONS.contains(&identifier.as_str()) {
                    return Err(format!("unknown function `{identifier}`"));
                }
                let arguments = self.arguments(children)?;
                apply_function(identifier, &arguments)
            }
            Operator::Neg => match children {
                [operand] => negate(self.eval(operand)?),
                _ => Err(incomplete()),
            },
            Operator::Add => {
                let (left, right) = self.operands(children)?;
                add(left, right)
            }
            Operator::Sub => {
                let (left, right) = self.operands(children)?;
                subtract(left, right)
            }
            Operator::Mul => {
                let (left, right) = self.operands(children)?;
                multiply(left, right)
            }
            Operator::Mod => {
                let (left, right) = self.operands(children)?;
                modulo(left, right)
            }
            Operator::Div => {
                let [left, right] = children else {
                    return Err(incomplete());
                };
                // In-order traversal meets the `/` nodes in source order.
                let left = self.eval(left)?;
                let floor = self.floor_divisions.get(self.next_division).copied().unwrap_or(false);
                self.next_division += 1;
                let right = self.eval(right)?;
                if floor {
                    floor_divide(left, right)
                } else {
                    divide(left, right)
                }
            }
            Operator::Exp => self.power_chain(node),
            other => Err(format!("unsupported operator `{other:?}`")),
        }
    }

    fn operands(&mut self, children: &[Node]) -> Result<(Number, Number), String> {
        match children {
            [left, right] => {
                let left = self.eval(left)?;
                Ok((left, self.eval(right)?))
            }
            _ => Err(incomplete()),
        }
    }

    fn arguments(&mut self, children: &[Node]) -> Result<Vec<Number>, String> {
        let [argument] = children else {
            return Err(incomplete());
        };
        let mut argument = argument;
        while let (Operator::RootNode, [inner]) = (argument.operator(), argument.children()) {
            argument = inner;
        }
        match argument.operator() {
            Operator::Tuple => argument.children().iter().map(|node| self.eval(node)).collect(),
            Operator::RootNode => Ok(Vec::new()),
            _ => Ok(vec![self.eval(argument)?]),
        }
    }

    // evalexpr folds a bare `^` chain to the left; `**` folds to the right.
    fn power_chain(&mut self, node: &Node) -> Result<Number, String> {
        let mut operands = Vec::new();
        let mut current = node;
        loop {
            let [base, exponent] = current.children() else {
                return Err(incomplete());
            };
            operands.push(exponent);
            if matches!(base.operator(), Operator::Exp) {
                current = base;
            } else {
                operands.push(base);
                break;
            }
        }
        operands.reverse();

        let values = operands.into_iter().map(|node| self.eval(node)).collect::<Result<Vec<_>, _>>()?;
        let mut values = values.into_iter().rev();
        let mut result = values.next().ok_or_else(incomplete)?;
        for base in values {
            result = power(base, result)?;
        }
        Ok(result)
    }
}

fn constant(value: &ExprValue) -> Result<Number, String> {
    match value {
        ExprValue::Int(value) => Ok(Number::Int(*value)),
        ExprValue::Float(value) => Ok(Number::Float(*value)),
        other => Err(format!("unsupported value `{other}`")),
    }
}

fn incomplete() -> String {
    "unexpected end of expression".to_string()
}

fn apply_function(name: &str, arguments: &[Number]) -> Result<Number, String> {
    let expected = if name == "arctan2" { 2 } else { 1 };
    if arguments.len() != expected {
        return Err(format!(
            "{name}() takes {expected} argument(s) but {} were given",
            arguments.len()
        ));
    }

    let x = arguments[0].as_f64();
    let result = match name {
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "arcsin" => x.asin(),
        "arccos" => x.acos(),
        "arctan" => x.atan(),
        "arctan2" => x.atan2(arguments[1].as_f64()),
        "sinh" => x.sinh(),
        "cosh" => x.cosh(),
        "tanh" => x.tanh(),
        "sqrt" => x.sqrt(),
        "exp" => x.exp(),
        "log" => x.ln(),
        "log10" => x.log10(),
        "log1p" => x.ln_1p(),
        "expm1" => x.exp_m1(),
        "abs" => x.abs(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        _ => return Err(format!("unknown function `{name}`")),
    };
    Ok(Number::Float(result))
}

fn overflow() -> String {
    "integer overflow".to_string()
}

fn division_by_zero() -> String {
    "division by zero".to_string()
}

fn add(left: Number, right: Number) -> Result<Number, String> {
    match (left, right) {
        (Number::Int(a), Number::Int(b)) => a.checked_add(b).map(Number::Int).ok_or_else(overflow),
        _ => Ok(Number::Float(left.as_f64() + right.as_f64())),
    }
}

fn subtract(left: Number, right: Number) -> Result<Number, String> {
    match (left, right) {
        (Number::Int(a), Number::Int(b)) => a.checked_sub(b).map(Number::Int).ok_or_else(overflow),
        _ => Ok(Number::Float(left.as_f64() - right.as_f64())),
    }
}

fn multiply(left: Number, right: Number) -> Result<Number, String> {
    match (left, right) {
        (Number::Int(a), Number::Int(b)) => a.checked_mul(b).map(Number::Int).ok_or_else(overflow),
        _ => Ok(Number::Float(left.as_f64() * right.as_f64())),
    }
}

fn divide(left: Number, right: Number) -> Result<Number, String> {
    let divisor = right.as_f64();
    if divisor == 0.0 {
        return Err(division_by_zero());
    }
    Ok(Number::Float(left.as_f64() / divisor))
}

fn floor_divide(left: Number, right: Number) -> Result<Number, String> {
    match (left, right) {
        (Number::Int(_), Number::Int(0)) => Err(division_by_zero()),
        (Number::Int(a), Number::Int(b)) => {
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Ok(Number::Int(if adjust { quotient - 1 } else { quotient }))
        }
        _ => {
            let divisor = right.as_f64();
            if divisor == 0.0 {
                return Err(division_by_zero());
            }
            Ok(Number::Float((left.as_f64() / divisor).floor()))
        }
    }
}

fn modulo(left: Number, right: Number) -> Result<Number, String> {
    match (left, right) {
        (Number::Int(_), Number::Int(0)) => Err(division_by_zero()),
        (Number::Int(a), Number::Int(b)) => {
            let remainder = a.checked_rem(b).ok_or_else(overflow)?;
            let adjust = remainder != 0 && ((remainder < 0) != (b < 0));
            Ok(Number::Int(if adjust { remainder + b } else { remainder }))
        }
        _ => {
            let (a, b) = (left.as_f64(), right.as_f64());
            if b == 0.0 {
                return Err(division_by_zero());
            }
            Ok(Number::Float(a - b * (a / b).floor()))
        }
    }
}

fn negate(value: Number) -> Result<Number, String> {
    match value {
        Number::Int(a) => a.checked_neg().map(Number::Int).ok_or_else(overflow),
        Number::Float(a) => Ok(Number::Float(-a)),
    }
}

fn power(base: Number, exponent: Number) -> Result<Number, String> {
    match (base, exponent) {
        (Number::Int(a), Number::Int(b)) if b >= 0 => {
            let exponent = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exponent).map(Number::Int).ok_or_else(overflow)
        }
        (Number::Int(0), Number::Int(_)) => Err(division_by_zero()),
        _ => Ok(Number::Float(base.as_f64().powf(exponent.as_f64()))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{evaluate, CalculatorTool, Number};
    use crate::tools::{Tool, ToolError};

    fn eval(expression: &str) -> String {
        evaluate(expression).map(|value| value.to_string()).unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(eval("2 + 2"), "4");
        assert_eq!(eval("2 ** 10"), "1024");
        assert_eq!(eval("(1 + 2) * 3 - 4"), "5");
        assert_eq!(eval("-7 // 2"), "-4");
        assert_eq!(eval("-7 % 3"), "2");
    }

    #[test]
    fn division_and_functions_yield_floats() {
        assert_eq!(eval("7 / 2"), "3.5");
        assert_eq!(eval("4 / 2"), "2.0");
        assert_eq!(eval("sqrt(16)"), "4.0");
        assert_eq!(eval("abs(-3)"), "3.0");
        assert_eq!(eval("floor(2.7) + 1"), "3.0");
        assert_eq!(eval("arctan2(0, 1)"), "0.0");
    }

    #[test]
    fn power_binds_tighter_than_unary_minus_and_is_right_associative() {
        assert_eq!(eval("-2 ** 2"), "-4");
        assert_eq!(eval("2 ** 3 ** 2"), "512");
        assert_eq!(eval("2 ** -1"), "0.5");
    }

    #[test]
    fn constants_are_available() {
        assert!(matches!(evaluate("pi"), Ok(Number::Float(value)) if value == std::f64::consts::PI));
        assert_eq!(eval("e ** 0"), "1.0");
    }

    #[test]
    fn floor_and_true_division_keep_their_source_order() {
        assert_eq!(eval("7 // 2 / 2"), "1.5");
        assert_eq!(eval("7 / 2 // 1"), "3.0");
        assert_eq!(eval("8 // (6 / 4)"), "5.0");
        assert_eq!(eval("+3 * -2"), "-6");
    }

    #[test]
    fn malformed_expressions_report_value_errors() {
        let error = eval("2 +");
        assert!(error.starts_with("calculator(\"2 +\") raised error: "));
        assert!(error.ends_with(". Please try again with a valid numerical expression"));
        assert!(eval("1 / 0").contains("division by zero"));
        assert!(eval("import os").contains("raised error"));
        assert!(eval("__import__('os')").contains("unexpected character"));
        assert!(eval("(1 + 2").contains("raised error"));
        assert!(eval("sqrt(1, 2)").contains("takes 1 argument(s)"));
        assert!(eval("9223372036854775807 + 1").contains("integer overflow"));
        assert!(eval("x = 3").contains("unexpected character `=`"));
    }

    #[test]
    fn oversized_or_deeply_nested_input_is_rejected_before_parsing() {
        let deep = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(matches!(evaluate(&deep), Err(ToolError::Calculator { .. })));
        assert!(eval(&deep).contains("longer than 256 characters"));

        let nested = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert!(eval(&nested).contains("nested deeper than 32 levels"));

        let signs = format!("{}1", "-".repeat(5_000));
        assert!(eval(&signs).contains("longer than 256 characters"));

        let bounded = format!("{}1{}", "(".repeat(32), ")".repeat(32));
        assert_eq!(eval(&bounded), "1");
    }

    #[tokio::test]
    async fn tool_returns_result_as_string() {
        let output = CalculatorTool.execute(json!({"expression": "10 % 4"})).await.expect("result");
        assert_eq!(output, json!("2"));

        let error = CalculatorTool.execute(json!({"expression": ""})).await;
        assert!(matches!(error, Err(ToolError::Calculator { .. })));
    }
}
