//! Bin Expressions
//!
//! Arithmetic expressions over the variables of a ray segment, used to
//! select contribution bins:
//!
//! ```text
//! if(Dz, 1 + floor(4 * atan2(Dy, Dx) / (2 * PI) + 0.5), 0)
//! ```

use crate::error::SimulError;
use rcore::geometry::Vector3f;
use rcore::math::*;
use pest::iterators::Pair;
use pest::Parser;
use std::collections::HashMap;

/// The `pest` parser generated from a grammar.
#[derive(Parser)]
#[grammar = "contrib/expr.pest"]
struct ExprParser;

/// Variables of a ray segment available to bin expressions.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayVars {
    /// Direction, `Dx Dy Dz`.
    pub dir: Vector3f,

    /// Origin, `Ox Oy Oz`.
    pub origin: Vector3f,

    /// Hit point, `Px Py Pz`.
    pub point: Vector3f,

    /// Surface normal, `Nx Ny Nz`.
    pub normal: Vector3f,

    /// Distance, `T`.
    pub distance: Float,

    /// Weight, `W`.
    pub weight: Float,
}

impl Default for RayVars {
    fn default() -> Self {
        Self {
            dir: Vector3f::zero(),
            origin: Vector3f::zero(),
            point: Vector3f::zero(),
            normal: Vector3f::zero(),
            distance: 0.0,
            weight: 1.0,
        }
    }
}

/// A ray variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RayVar {
    Dx,
    Dy,
    Dz,
    Ox,
    Oy,
    Oz,
    Px,
    Py,
    Pz,
    Nx,
    Ny,
    Nz,
    T,
    W,
}

impl RayVar {
    fn from_name(name: &str) -> Option<Self> {
        let v = match name {
            "Dx" => Self::Dx,
            "Dy" => Self::Dy,
            "Dz" => Self::Dz,
            "Ox" => Self::Ox,
            "Oy" => Self::Oy,
            "Oz" => Self::Oz,
            "Px" => Self::Px,
            "Py" => Self::Py,
            "Pz" => Self::Pz,
            "Nx" => Self::Nx,
            "Ny" => Self::Ny,
            "Nz" => Self::Nz,
            "T" => Self::T,
            "W" => Self::W,
            _ => return None,
        };
        Some(v)
    }

    fn value(&self, v: &RayVars) -> Float {
        match self {
            Self::Dx => v.dir.x,
            Self::Dy => v.dir.y,
            Self::Dz => v.dir.z,
            Self::Ox => v.origin.x,
            Self::Oy => v.origin.y,
            Self::Oz => v.origin.z,
            Self::Px => v.point.x,
            Self::Py => v.point.y,
            Self::Pz => v.point.z,
            Self::Nx => v.normal.x,
            Self::Ny => v.normal.y,
            Self::Nz => v.normal.z,
            Self::T => v.distance,
            Self::W => v.weight,
        }
    }
}

/// A built-in function.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Func {
    If,
    Abs,
    Sqrt,
    Floor,
    Ceil,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Exp,
    Log,
    Min,
    Max,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        let f = match name {
            "if" => Self::If,
            "abs" => Self::Abs,
            "sqrt" => Self::Sqrt,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "atan2" => Self::Atan2,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        };
        Some(f)
    }

    /// Returns true if `n` arguments are accepted.
    fn accepts(&self, n: usize) -> bool {
        match self {
            Self::If => n == 3,
            Self::Atan2 => n == 2,
            Self::Min | Self::Max => n >= 1,
            _ => n == 1,
        }
    }
}

/// A binary operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// A compiled expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(Float),
    Var(RayVar),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    /// Compile an expression. Identifiers resolve to parameters first, then
    /// to ray variables and `PI`.
    ///
    /// * `text`   - The expression.
    /// * `params` - Named constants.
    pub fn compile(text: &str, params: &HashMap<String, Float>) -> Result<Self, SimulError> {
        let pair = parse_rule(Rule::bin_expr, text)?;
        let expr = first_inner(pair)?;
        Compiler { params, ray_vars: true }.expr(expr)
    }

    /// Evaluate the expression.
    ///
    /// * `v` - Ray variables.
    pub fn eval(&self, v: &RayVars) -> Float {
        match self {
            Self::Num(x) => *x,
            Self::Var(var) => var.value(v),
            Self::Neg(e) => -e.eval(v),
            Self::Binary(op, a, b) => {
                let (a, b) = (a.eval(v), b.eval(v));
                match op {
                    Op::Add => a + b,
                    Op::Sub => a - b,
                    Op::Mul => a * b,
                    Op::Div => a / b,
                    Op::Pow => a.powf(b),
                }
            }
            Self::Call(f, args) => {
                let arg = |i: usize| args[i].eval(v);
                match f {
                    Func::If => {
                        if arg(0) > 0.0 {
                            arg(1)
                        } else {
                            arg(2)
                        }
                    }
                    Func::Abs => arg(0).abs(),
                    Func::Sqrt => arg(0).sqrt(),
                    Func::Floor => arg(0).floor(),
                    Func::Ceil => arg(0).ceil(),
                    Func::Sin => arg(0).sin(),
                    Func::Cos => arg(0).cos(),
                    Func::Tan => arg(0).tan(),
                    Func::Asin => arg(0).asin(),
                    Func::Acos => arg(0).acos(),
                    Func::Atan => arg(0).atan(),
                    Func::Atan2 => arg(0).atan2(arg(1)),
                    Func::Exp => arg(0).exp(),
                    Func::Log => arg(0).ln(),
                    Func::Min => args.iter().map(|e| e.eval(v)).fold(INFINITY, Float::min),
                    Func::Max => args.iter().map(|e| e.eval(v)).fold(-INFINITY, Float::max),
                }
            }
        }
    }
}

/// Parse parameter assignments such as `MF=1,rNx=0`. Later assignments may
/// use earlier ones.
///
/// * `text` - The assignments.
pub fn parse_params(text: &str) -> Result<HashMap<String, Float>, SimulError> {
    let mut params = HashMap::new();
    for assign in parse_rule(Rule::params, text)?.into_inner() {
        if assign.as_rule() != Rule::assign {
            continue;
        }
        let mut inner = assign.into_inner();
        let (name, value) = match (inner.next(), inner.next()) {
            (Some(n), Some(v)) => (n.as_str().to_string(), v),
            _ => return Err(SimulError::Expression(String::from("incomplete assignment"))),
        };
        let e = Compiler {
            params: &params,
            ray_vars: false,
        }
        .expr(value)?;
        let x = e.eval(&RayVars::default());
        params.insert(name, x);
    }
    Ok(params)
}

fn parse_rule(rule: Rule, text: &str) -> Result<Pair<'_, Rule>, SimulError> {
    ExprParser::parse(rule, text)
        .map_err(|e| SimulError::Expression(format!("'{}'. {}", text, e)))?
        .next()
        .ok_or_else(|| SimulError::Expression(format!("'{}' is empty", text)))
}

fn first_inner(pair: Pair<'_, Rule>) -> Result<Pair<'_, Rule>, SimulError> {
    let text = pair.as_str().to_string();
    pair.into_inner()
        .next()
        .ok_or_else(|| SimulError::Expression(format!("'{}' is incomplete", text)))
}

/// Builds expressions from parse trees.
struct Compiler<'a> {
    params: &'a HashMap<String, Float>,
    ray_vars: bool,
}

impl<'a> Compiler<'a> {
    /// `expr` and `term` rules: operands separated by operators.
    fn expr(&self, pair: Pair<Rule>) -> Result<Expr, SimulError> {
        match pair.as_rule() {
            Rule::expr | Rule::term => {
                let mut inner = pair.into_inner();
                let first = inner
                    .next()
                    .ok_or_else(|| SimulError::Expression(String::from("missing operand")))?;
                let mut lhs = self.expr(first)?;
                while let (Some(op), Some(rhs)) = (inner.next(), inner.next()) {
                    let op = match op.as_rule() {
                        Rule::add => Op::Add,
                        Rule::sub => Op::Sub,
                        Rule::mul => Op::Mul,
                        _ => Op::Div,
                    };
                    lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.expr(rhs)?));
                }
                Ok(lhs)
            }
            Rule::factor => {
                let mut negations = 0;
                let mut operand = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::neg => negations += 1,
                        _ => operand = Some(self.expr(p)?),
                    }
                }
                let mut e = operand.ok_or_else(|| SimulError::Expression(String::from("missing operand")))?;
                for _ in 0..negations {
                    e = Expr::Neg(Box::new(e));
                }
                Ok(e)
            }
            Rule::power => {
                let mut inner = pair.into_inner();
                let base = inner
                    .next()
                    .ok_or_else(|| SimulError::Expression(String::from("missing operand")))?;
                let base = self.expr(base)?;
                match inner.next() {
                    Some(exp) => Ok(Expr::Binary(Op::Pow, Box::new(base), Box::new(self.expr(exp)?))),
                    None => Ok(base),
                }
            }
            Rule::number => pair
                .as_str()
                .parse::<Float>()
                .map(Expr::Num)
                .map_err(|e| SimulError::Expression(format!("'{}'. {}", pair.as_str(), e))),
            Rule::ident => self.ident(pair.as_str()),
            Rule::call => {
                let mut inner = pair.into_inner();
                let name = inner
                    .next()
                    .ok_or_else(|| SimulError::Expression(String::from("missing function name")))?
                    .as_str();
                let f = Func::from_name(name)
                    .ok_or_else(|| SimulError::Expression(format!("unknown function '{}'", name)))?;
                let args = inner.map(|p| self.expr(p)).collect::<Result<Vec<_>, _>>()?;
                if !f.accepts(args.len()) {
                    return Err(SimulError::Expression(format!(
                        "'{}' does not take {} arguments",
                        name,
                        args.len()
                    )));
                }
                Ok(Expr::Call(f, args))
            }
            r => Err(SimulError::Expression(format!("unexpected {:?}", r))),
        }
    }

    fn ident(&self, name: &str) -> Result<Expr, SimulError> {
        if let Some(x) = self.params.get(name) {
            return Ok(Expr::Num(*x));
        }
        if name == "PI" {
            return Ok(Expr::Num(PI));
        }
        match RayVar::from_name(name) {
            Some(v) if self.ray_vars => Ok(Expr::Var(v)),
            Some(_) => Err(SimulError::Expression(format!("ray variable '{}' in a parameter", name))),
            None => Err(SimulError::Expression(format!("unknown variable '{}'", name))),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;
    use proptest::prelude::*;

    fn eval(text: &str) -> Float {
        Expr::compile(text, &HashMap::new()).unwrap().eval(&RayVars::default())
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("8 - 3 - 2"), 3.0);
        assert_eq!(eval("8 / 4 / 2"), 1.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("2 ^ -1"), 0.5);
        assert_eq!(eval("1 - -1"), 2.0);
        assert_eq!(eval("1.5e1 + .5"), 15.5);
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(eval("if(1, 2, 3)"), 2.0);
        assert_eq!(eval("if(0, 2, 3)"), 3.0);
        assert_eq!(eval("if(-1, 2, 3)"), 3.0);
        assert_eq!(eval("min(3, 1, 2) + max(4, 5)"), 6.0);
        assert_eq!(eval("floor(2.7) + ceil(0.2) + abs(-1)"), 4.0);
        assert!(approx_eq!(Float, eval("atan2(1, 0)"), PI / 2.0));
        assert!(approx_eq!(Float, eval("log(exp(2))"), 2.0));
        assert!(approx_eq!(Float, eval("sin(PI/2) + cos(0) + sqrt(4)"), 4.0));
    }

    #[test]
    fn ray_variables_and_parameters() {
        let params = parse_params("MF=2, rNx=MF*3").unwrap();
        assert_eq!(params["rNx"], 6.0);
        let e = Expr::compile("Dz * MF + rNx + W + T", &params).unwrap();
        let vars = RayVars {
            dir: Vector3f::new(0.0, 0.0, -1.0),
            distance: 10.0,
            weight: 0.5,
            ..RayVars::default()
        };
        assert_eq!(e.eval(&vars), -2.0 + 6.0 + 0.5 + 10.0);
        assert!(parse_params("").unwrap().is_empty());
    }

    #[test]
    fn bad_expressions_are_rejected() {
        let none = HashMap::new();
        for text in ["", "1 +", "foo", "nosuch(1)", "if(1, 2)", "atan2(1)", "(1", "Dx Dy"] {
            assert!(
                matches!(Expr::compile(text, &none), Err(SimulError::Expression(_))),
                "{}",
                text
            );
        }
        assert!(parse_params("a=Dx").is_err());
        assert!(parse_params("a=").is_err());
    }

    proptest! {
        #[test]
        fn arithmetic_matches_rust(a in -100.0..100.0f64, b in -100.0..100.0f64, c in 0.5..10.0f64) {
            let text = format!("({}) + ({}) * ({}) - ({}) / ({})", a, b, c, a, c);
            prop_assert!(approx_eq!(Float, eval(&text), a + b * c - a / c, epsilon = 1e-9));
        }
    }
}
