use std::{
    cell::RefCell,
    io::{Stdout, Write},
    rc::Rc,
};

use cursor::Line;
use errors::{LoxError, LoxErrors};
use itertools::{Either, Itertools};
use parser::{Expr, LiteralValue, Parser, Stmt};
use rust_decimal::Decimal;
use scanner::{Token, TokenType};

mod value;
pub use value::Value;

mod environment;
pub use environment::Environment;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("[line {line}] Error{at}: {error}")]
pub struct RuntimeError {
    pub error: RuntimeErrorType,
    pub line: Line,
    pub at: String,
}

impl From<RuntimeError> for LoxError {
    fn from(e: RuntimeError) -> Self {
        LoxError::new(e.line, e.at, e.error)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuntimeErrorType {
    #[error("Operand must be a number.")]
    UnaryMinusOnNonNumber(Value),
    #[error("Operands must be numbers.")]
    NonNumberOperands(Value, Value),
    #[error("Operands must be two numbers or two strings.")]
    InvalidAddOperands(Value, Value),
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Numeric overflow.")]
    Overflow,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
}

impl RuntimeErrorType {
    fn at(self, token: &Token) -> RuntimeError {
        RuntimeError { error: self, line: token.line(), at: errors::location(token.lexeme()) }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InterpretError {
    /// Lexical and syntax errors. Nothing was executed.
    #[error("{0}")]
    Static(#[from] LoxErrors),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InterpretError>;

/// Scans and parses `source`, collecting every lexical and syntax error.
pub fn parse_source(source: &str) -> std::result::Result<Vec<Stmt<'_>>, LoxErrors> {
    let (tokens, scan_errors): (Vec<_>, Vec<_>) =
        scanner::scan(source).into_iter().partition_map(|result| match result {
            Ok(token) => Either::Left(token),
            Err(e) => Either::Right(e),
        });

    let (stmts, parse_errors) = Parser::new(tokens).parse();

    let mut errors: LoxErrors = scan_errors.into_iter().map(LoxError::from).collect();
    errors.extend(parse_errors);
    errors.sort_by_key(|e| e.line);

    if errors.is_empty() {
        Ok(stmts)
    } else {
        Err(errors)
    }
}

#[derive(Debug)]
pub struct Interpreter<W: Write = Stdout> {
    globals: Rc<RefCell<Environment>>,
    out: W,
}

impl Default for Interpreter<Stdout> {
    fn default() -> Self {
        Self::with_output(std::io::stdout())
    }
}

impl<W: Write> Interpreter<W> {
    pub fn with_output(out: W) -> Self {
        Self { globals: Environment::global(), out }
    }

    pub fn globals(&self) -> &Rc<RefCell<Environment>> {
        &self.globals
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Runs a complete program against the global environment. If there are any static
    /// errors, nothing is executed.
    pub fn run_source(&mut self, source: &str) -> Result<()> {
        let stmts = parse_source(source)?;
        let globals = self.globals.clone();
        self.interpret(&stmts, &globals)
    }

    /// Like [`Self::run_source`], but a line consisting of a single expression statement
    /// also prints its value.
    pub fn run_prompt_line(&mut self, source: &str) -> Result<()> {
        let stmts = parse_source(source)?;
        let globals = self.globals.clone();

        if let [Stmt::Expression(expr)] = stmts.as_slice() {
            let value = self.evaluate(expr, &globals)?;
            writeln!(self.out, "{}", value)?;
            return Ok(());
        }

        self.interpret(&stmts, &globals)
    }

    pub fn interpret(&mut self, stmts: &[Stmt], env: &Rc<RefCell<Environment>>) -> Result<()> {
        for s in stmts {
            self.execute(s, env)?;
        }
        Ok(())
    }

    fn execute(&mut self, stmt: &Stmt, env: &Rc<RefCell<Environment>>) -> Result<()> {
        log::trace!("Executing {}", stmt);
        match stmt {
            Stmt::Print(expr) => {
                let value = self.evaluate(expr, env)?;
                writeln!(self.out, "{}", value)?;
                Ok(())
            }
            Stmt::Expression(expr) => {
                self.evaluate(expr, env)?;
                Ok(())
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(init) => self.evaluate(init, env)?,
                    None => Value::Nil,
                };
                env.borrow_mut().define(name.lexeme(), value);
                Ok(())
            }
            Stmt::Block(stmts) => {
                log::debug!("Entering block scope");
                // The parent frame stays in `env`, so leaving this arm on any path
                // makes it the active one again.
                let scope = Environment::new_enclosed(env);
                let result = self.interpret(stmts, &scope);
                log::debug!("Leaving block scope");
                result
            }
        }
    }

    fn evaluate(
        &self,
        expr: &Expr,
        env: &Rc<RefCell<Environment>>,
    ) -> std::result::Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(LiteralValue::Number(n)) => Ok((*n).into()),
            Expr::Literal(LiteralValue::Str(s)) => Ok((*s).into()),
            Expr::Literal(LiteralValue::Boolean(b)) => Ok((*b).into()),
            Expr::Literal(LiteralValue::Nil) => Ok(Value::Nil),

            Expr::Grouping(expr) => self.evaluate(expr, env),

            Expr::Unary { operator, right } => {
                let right = self.evaluate(right, env)?;
                match (operator.ty(), right) {
                    (TokenType::Minus, Value::Number(n)) => Ok((-n).into()),
                    (TokenType::Minus, v) => {
                        Err(RuntimeErrorType::UnaryMinusOnNonNumber(v).at(operator))
                    }
                    (TokenType::Bang, v) => Ok((!v.is_truthy()).into()),
                    (ty, _) => unreachable!("Parser produced unary operator {:?}", ty),
                }
            }

            Expr::Variable(name) => env.borrow().get(name.lexeme()).ok_or_else(|| {
                RuntimeErrorType::UndefinedVariable(name.lexeme().to_string()).at(name)
            }),

            Expr::Assign { name, value } => {
                let value = self.evaluate(value, env)?;
                if env.borrow_mut().assign(name.lexeme(), value.clone()) {
                    Ok(value)
                } else {
                    Err(RuntimeErrorType::UndefinedVariable(name.lexeme().to_string()).at(name))
                }
            }

            Expr::Binary { left, operator, right } => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                binary(left, operator, right)
            }
        }
    }
}

fn binary(left: Value, operator: &Token, right: Value) -> std::result::Result<Value, RuntimeError> {
    use TokenType::*;

    let checked = |result: Option<Decimal>| {
        result.map(Value::Number).ok_or_else(|| RuntimeErrorType::Overflow.at(operator))
    };

    // Sums and differences are exact. `Decimal` rounds when the result needs more digits than
    // it has, which leaves it with a smaller scale than the finer operand.
    let exact = |l: &Decimal, r: &Decimal, op: fn(Decimal, Decimal) -> Option<Decimal>| {
        let (l, r) = (l.normalize(), r.normalize());
        checked(op(l, r).filter(|n| n.scale() >= l.scale().max(r.scale())))
    };

    match (&left, &right, operator.ty()) {
        (Value::Number(l), Value::Number(r), Minus) => exact(l, r, Decimal::checked_sub),
        (Value::Number(l), Value::Number(r), Plus) => exact(l, r, Decimal::checked_add),
        (Value::Number(l), Value::Number(r), Star) => checked(l.checked_mul(*r)),
        (Value::Number(l), Value::Number(r), Slash) => {
            if r.is_zero() {
                Err(RuntimeErrorType::DivisionByZero.at(operator))
            } else {
                checked(l.checked_div(*r))
            }
        }
        (Value::Str(l), Value::Str(r), Plus) => Ok(format!("{l}{r}").into()),

        (Value::Number(l), Value::Number(r), Greater) => Ok((l > r).into()),
        (Value::Number(l), Value::Number(r), GreaterEqual) => Ok((l >= r).into()),
        (Value::Number(l), Value::Number(r), Less) => Ok((l < r).into()),
        (Value::Number(l), Value::Number(r), LessEqual) => Ok((l <= r).into()),

        (_, _, EqualEqual) => Ok((left == right).into()),
        (_, _, BangEqual) => Ok((left != right).into()),

        (_, _, Plus) => Err(RuntimeErrorType::InvalidAddOperands(left, right).at(operator)),
        (_, _, Minus | Star | Slash | Greater | GreaterEqual | Less | LessEqual) => {
            Err(RuntimeErrorType::NonNumberOperands(left, right).at(operator))
        }

        (_, _, ty) => unreachable!("Parser produced binary operator {:?}", ty),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[ctor::ctor]
    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn run(source: &str) -> (String, Option<InterpretError>) {
        let mut interpreter = Interpreter::with_output(Vec::new());
        let error = interpreter.run_source(source).err();
        (String::from_utf8(interpreter.output().clone()).unwrap(), error)
    }

    fn output(source: &str) -> String {
        let (output, error) = run(source);
        assert!(error.is_none(), "unexpected error: {:?}", error);
        output
    }

    fn runtime_error(source: &str) -> RuntimeError {
        match run(source).1 {
            Some(InterpretError::Runtime(e)) => e,
            other => panic!("expected runtime error, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic() {
        assert_eq!(output("print 1 + 2 * 3;"), "7\n");
        assert_eq!(output("print (1 + 2) * 3;"), "9\n");
        assert_eq!(output("print 10 - 4 - 3;"), "3\n");
        assert_eq!(output("print 10 / 4;"), "2.5\n");
        assert_eq!(output("print 2.5 * 2;"), "5\n");
        assert_eq!(output("print -(3 - 5);"), "2\n");
    }

    #[test]
    fn decimal_precision() {
        assert_eq!(output("print 0.1 + 0.2;"), "0.3\n");
        assert_eq!(output("print 0.1 + 0.2 == 0.3;"), "true\n");
        assert_eq!(output("print 1 / 3;"), "0.3333333333333333333333333333\n");
        assert_eq!(output("print 1.50;"), "1.5\n");
        assert_eq!(output("print 1.0 == 1;"), "true\n");
    }

    #[test]
    fn strings_and_equality() {
        assert_eq!(output("print \"foo\" + \"bar\";"), "foobar\n");
        assert_eq!(output("print \"a\" == \"a\";"), "true\n");
        assert_eq!(output("print nil == nil;"), "true\n");
        assert_eq!(output("print nil == false;"), "false\n");
        assert_eq!(output("print 1 == \"1\";"), "false\n");
        assert_eq!(output("print 1 != 2;"), "true\n");
    }

    #[test]
    fn comparison() {
        assert_eq!(
            output("print 1 < 2; print 2 <= 2; print 3 > 4; print 4 >= 5;"),
            "true\ntrue\nfalse\nfalse\n"
        );
    }

    #[test]
    fn truthiness() {
        assert_eq!(
            output("print !nil; print !false; print !0; print !\"\"; print !!true;"),
            "true\ntrue\nfalse\nfalse\ntrue\n"
        );
    }

    #[test]
    fn variables_and_scopes() {
        assert_eq!(output("var a = 1; { var a = 2; print a; } print a;"), "2\n1\n");
        assert_eq!(output("var a; print a;"), "nil\n");
        assert_eq!(output("var a = 1; { a = 3; } print a;"), "3\n");
        assert_eq!(output("var a = 1; var a = 2; print a;"), "2\n");
        assert_eq!(output("var a = \"outer\"; { var b = a + \"!\"; { print b; } }"), "outer!\n");
    }

    #[test]
    fn chained_assignment() {
        assert_eq!(output("var a; var b; a = b = 4; print a; print b;"), "4\n4\n");
        assert_eq!(output("var a; print a = \"x\";"), "x\n");
    }

    #[test]
    fn assign_to_undefined_creates_no_binding() {
        let mut interpreter = Interpreter::with_output(Vec::new());
        let error = interpreter.run_source("a = 5;").unwrap_err();
        assert_eq!(error.to_string(), "[line 1] Error at 'a': Undefined variable 'a'.");
        assert_eq!(interpreter.globals().borrow().get("a"), None);
    }

    #[test]
    fn undefined_variable() {
        let error = runtime_error("print 1;\nprint nope;");
        assert_eq!(error.error, RuntimeErrorType::UndefinedVariable("nope".to_string()));
        assert_eq!(error.line, Line(2));
    }

    #[test]
    fn type_errors() {
        let error = runtime_error("\"foo\" + 1;");
        assert_eq!(
            error.to_string(),
            "[line 1] Error at '+': Operands must be two numbers or two strings."
        );
        assert_eq!(
            error.error,
            RuntimeErrorType::InvalidAddOperands("foo".into(), Decimal::ONE.into())
        );

        assert_eq!(
            runtime_error("print -\"x\";").to_string(),
            "[line 1] Error at '-': Operand must be a number."
        );
        assert_eq!(
            runtime_error("print true < 1;").to_string(),
            "[line 1] Error at '<': Operands must be numbers."
        );
        assert_eq!(
            runtime_error("print \"a\" * 2;").to_string(),
            "[line 1] Error at '*': Operands must be numbers."
        );
    }

    #[test]
    fn arithmetic_errors() {
        assert_eq!(runtime_error("print 1 / 0;").error, RuntimeErrorType::DivisionByZero);
        assert_eq!(
            runtime_error("print 79228162514264337593543950335 * 2;").error,
            RuntimeErrorType::Overflow
        );
    }

    #[test]
    fn sums_never_round() {
        assert_eq!(
            runtime_error("print 10000000000000000000000000000 + 0.5;").error,
            RuntimeErrorType::Overflow
        );
        assert_eq!(
            runtime_error("print 10 - 0.0000000000000000000000000001;").error,
            RuntimeErrorType::Overflow
        );
        assert_eq!(output("print 10000000000000000000000000000 + 5;"), "10000000000000000000000000005\n");
        assert_eq!(output("print 0.5 + 0.5;"), "1\n");
        assert_eq!(output("print 1.50 - 0.25;"), "1.25\n");
        assert_eq!(
            output("print 0.1234567890123456789012345678 == 0.1234567890123456789012345679;"),
            "false\n"
        );
    }

    #[test]
    fn operands_are_evaluated_left_to_right() {
        let error = runtime_error("var a = 1; (a = 2) + (b = 3);");
        assert_eq!(error.error, RuntimeErrorType::UndefinedVariable("b".to_string()));

        let mut interpreter = Interpreter::with_output(Vec::new());
        interpreter.run_source("var a = 1;").unwrap();
        interpreter.run_source("(a = 2) + (b = 3);").unwrap_err();
        assert_eq!(interpreter.globals().borrow().get("a"), Some(Decimal::TWO.into()));
    }

    #[test]
    fn output_before_runtime_error_is_kept() {
        let (output, error) = run("print 1; print nil + 1; print 2;");
        assert_eq!(output, "1\n");
        assert!(matches!(error, Some(InterpretError::Runtime(_))));
    }

    #[test]
    fn scope_is_restored_after_error_in_block() {
        let mut interpreter = Interpreter::with_output(Vec::new());
        interpreter.run_source("var a = \"global\";").unwrap();
        interpreter.run_source("{ var a = \"local\"; print a; print undefined; }").unwrap_err();
        interpreter.run_source("print a;").unwrap();
        assert_eq!(String::from_utf8_lossy(interpreter.output()), "local\nglobal\n");
    }

    #[test]
    fn static_errors_prevent_execution() {
        let (output, error) = run("print 1;\nprint 2 +;\nvar x = @3;");
        assert_eq!(output, "");
        assert_eq!(
            error.unwrap().to_string(),
            "[line 2] Error at ';': Expect expression.\n[line 3] Error: Unexpected character."
        );
    }

    #[test]
    fn prompt_line_echoes_expressions() {
        let mut interpreter = Interpreter::with_output(Vec::new());
        interpreter.run_prompt_line("var a = 2;").unwrap();
        interpreter.run_prompt_line("a * 21;").unwrap();
        interpreter.run_prompt_line("print a; a;").unwrap();
        interpreter.run_prompt_line("\"hi\";").unwrap();
        assert_eq!(String::from_utf8_lossy(interpreter.output()), "42\n2\nhi\n");
    }

    #[test]
    fn interpret_against_explicit_environment() {
        let stmts = parse_source("var b = a + 1; print b;").unwrap();
        let mut interpreter = Interpreter::with_output(Vec::new());

        let env = Environment::global();
        env.borrow_mut().define("a", Decimal::ONE.into());
        interpreter.interpret(&stmts, &env).unwrap();

        assert_eq!(env.borrow().get("b"), Some(Decimal::TWO.into()));
        assert_eq!(interpreter.globals().borrow().get("b"), None);
        assert_eq!(String::from_utf8_lossy(interpreter.output()), "2\n");
    }
}
