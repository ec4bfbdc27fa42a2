use std::{
    collections::HashMap,
    io::{self, BufRead, Write},
};

use log::{debug, log_enabled, trace, warn, Level};

use crate::ir::{ArithOp, Instr, Opcode, Operand, Program};
use crate::types::Ty;
use crate::value::{self, interpret_escapes, Fault, Value, DIVISION_BY_ZERO_SENTINEL};
use crate::vars::Vars;

/// Caller-supplied limits for a run.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Config {
    /// Maximum number of instructions to dispatch. `None` runs until the
    /// program ends.
    pub budget: Option<u64>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum State {
    Ready,
    Running,
    Halted(Halt),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Halt {
    Normal,
    Error,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Faults that stop a run. Recoverable operator faults never get here; they
/// are logged and replaced by a default value.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("label `{label}` is defined twice, at {first} and {second}")]
    DuplicateLabel {
        label: String,
        first: usize,
        second: usize,
    },
    #[error("{at}: {instr}: undefined label `{label}`")]
    UnresolvedLabel {
        at: usize,
        instr: String,
        label: String,
    },
    #[error("{at}: {instr}: unknown opcode `{op}`")]
    UnknownOpcode { at: usize, instr: String, op: String },
    #[error("{at}: {instr}: {reason}")]
    Malformed {
        at: usize,
        instr: String,
        reason: &'static str,
    },
    #[error("instruction budget of {budget} exhausted at {at}")]
    BudgetExhausted { budget: u64, at: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Fetch-dispatch loop over a [`Program`].
///
/// Labels are resolved once, when the engine is built, so a jump to a label
/// lands on the `LABEL` instruction itself whether it comes before or after
/// the jump. Every label a `JUMP` or `IF` names must exist by then, taken
/// branch or not.
#[derive(Debug)]
pub struct Engine {
    program: Program,
    labels: HashMap<String, usize>,
    vars: Vars,
    ip: usize,
    state: State,
    executed: u64,
    config: Config,
}

impl Engine {
    pub fn new(program: Program, config: Config) -> Result<Self> {
        let mut labels = HashMap::new();
        for (at, instr) in program.iter().enumerate() {
            if instr.op != Opcode::Label {
                continue;
            }
            let label = instr
                .dest
                .name()
                .ok_or_else(|| malformed(at, instr, "label is not a name"))?;
            if let Some(first) = labels.insert(label.to_string(), at) {
                return Err(Error::DuplicateLabel {
                    label: label.to_string(),
                    first,
                    second: at,
                });
            }
        }
        for (at, instr) in program.iter().enumerate() {
            match instr.op {
                Opcode::Jump => {
                    lookup(&labels, at, instr, &instr.dest)?;
                }
                Opcode::If => {
                    lookup(&labels, at, instr, &instr.src1)?;
                    lookup(&labels, at, instr, &instr.src2)?;
                }
                _ => {}
            }
        }
        debug!(
            "loaded {} instructions, {} labels",
            program.len(),
            labels.len()
        );
        Ok(Self {
            program,
            labels,
            vars: Vars::new(),
            ip: 0,
            state: State::Ready,
            executed: 0,
            config,
        })
    }

    /// Runs until the program ends or a fatal fault halts it.
    pub fn run<R: BufRead, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<()> {
        let res = loop {
            match self.step(input, output) {
                Ok(true) => continue,
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        output.flush()?;
        debug!(
            "{:?} after {} instructions, {} temps",
            self.state,
            self.executed,
            self.vars.temp_count()
        );
        if log_enabled!(Level::Trace) {
            for (name, value) in self.vars.user_vars() {
                trace!("{name} = {value}");
            }
        }
        res
    }

    /// Executes one instruction. Returns `false` once the engine has halted.
    pub fn step<R: BufRead, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<bool> {
        match self.state {
            State::Halted(_) => return Ok(false),
            State::Ready => self.state = State::Running,
            State::Running => {}
        }
        if self.ip >= self.program.len() {
            self.state = State::Halted(Halt::Normal);
            return Ok(false);
        }
        if let Some(budget) = self.config.budget {
            if self.executed >= budget {
                self.state = State::Halted(Halt::Error);
                return Err(Error::BudgetExhausted {
                    budget,
                    at: self.ip,
                });
            }
        }
        self.executed += 1;
        if let Err(err) = self.exec(input, output) {
            self.state = State::Halted(Halt::Error);
            return Err(err);
        }
        if self.ip >= self.program.len() {
            self.state = State::Halted(Halt::Normal);
            return Ok(false);
        }
        Ok(true)
    }

    fn exec<R: BufRead, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<()> {
        let at = self.ip;
        let instr = &self.program[at];
        trace!("{at}: {instr}");
        let mut next = at + 1;
        match &instr.op {
            Opcode::Arith(op) => {
                let res = match (self.resolve(&instr.src1), self.resolve(&instr.src2)) {
                    (Some(lhs), Some(rhs)) => lhs.arith(*op, &rhs),
                    (Some(operand), None) if *op == ArithOp::Add => operand.plus(),
                    (Some(operand), None) if *op == ArithOp::Sub => operand.neg(),
                    _ => return Err(malformed(at, instr, "missing operand")),
                };
                let value = recover(at, instr, res, |fault| match fault {
                    Fault::DivisionByZero { .. } => DIVISION_BY_ZERO_SENTINEL,
                    _ => Value::Int(0),
                });
                self.vars.set(dest(at, instr)?, value);
            }
            Opcode::Logic(op) => {
                let Some(lhs) = self.resolve(&instr.src1) else {
                    return Err(malformed(at, instr, "missing operand"));
                };
                let rhs = self.resolve(&instr.src2);
                let res = lhs.logic(*op, rhs.as_ref());
                let value = recover(at, instr, res, |_| Value::Bool(false));
                self.vars.set(dest(at, instr)?, value);
            }
            Opcode::Rel(op) => {
                let (Some(lhs), Some(rhs)) =
                    (self.resolve(&instr.src1), self.resolve(&instr.src2))
                else {
                    return Err(malformed(at, instr, "missing operand"));
                };
                let res = lhs.relate(*op, &rhs).map(Value::Bool);
                let value = recover(at, instr, res, |_| Value::Bool(false));
                self.vars.set(dest(at, instr)?, value);
            }
            Opcode::Assign => {
                let Some(value) = self.resolve(&instr.src1) else {
                    return Err(malformed(at, instr, "assignment without a source"));
                };
                self.vars.set(dest(at, instr)?, value);
            }
            Opcode::Label => {}
            Opcode::Jump => next = self.target(at, instr, &instr.dest)?,
            Opcode::If => {
                let Some(cond) = self.resolve(&instr.dest) else {
                    return Err(malformed(at, instr, "missing condition"));
                };
                let then = self.target(at, instr, &instr.src1)?;
                let otherwise = self.target(at, instr, &instr.src2)?;
                next = if cond.truthy() { then } else { otherwise };
            }
            Opcode::Call => match instr.dest.name() {
                Some("PRINT") => {
                    let value = self
                        .resolve(&instr.src1)
                        .or_else(|| self.resolve(&instr.src2))
                        .ok_or_else(|| malformed(at, instr, "nothing to print"))?;
                    match value {
                        Value::Str(raw) => output.write_all(interpret_escapes(&raw).as_bytes())?,
                        other => write!(output, "{other}")?,
                    }
                }
                Some("SCAN") => {
                    let ty = instr.src1.name().and_then(Ty::from_name).unwrap_or(Ty::Str);
                    let name = instr
                        .src2
                        .name()
                        .ok_or_else(|| malformed(at, instr, "scan target is not a variable"))?;
                    if !self.vars.contains(name) {
                        self.vars.set(name, ty.zero());
                    }
                    output.flush()?;
                    let mut line = String::new();
                    input.read_line(&mut line)?;
                    let value = ty.coerce(&line).unwrap_or_else(|| {
                        warn!("{at}: {instr}: {:?} is not a valid {ty}, using {}", line.trim(), ty.zero());
                        ty.zero()
                    });
                    self.vars.set(name, value);
                }
                _ => return Err(malformed(at, instr, "unknown CALL target")),
            },
            Opcode::Unknown(op) => {
                return Err(Error::UnknownOpcode {
                    at,
                    instr: instr.to_string(),
                    op: op.clone(),
                })
            }
        }
        self.ip = next;
        Ok(())
    }

    /// Constants pass through; names read the store and default to `0`.
    fn resolve(&self, operand: &Operand) -> Option<Value> {
        match operand {
            Operand::Empty => None,
            Operand::Const(value) => Some(value.clone()),
            Operand::Name(name) => Some(match self.vars.get(name) {
                Some(value) => value.clone(),
                None => {
                    debug!("`{name}` is unbound, reading 0");
                    Value::Int(0)
                }
            }),
        }
    }

    fn target(&self, at: usize, instr: &Instr, label: &Operand) -> Result<usize> {
        lookup(&self.labels, at, instr, label)
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Number of instructions dispatched so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }
}

fn recover(
    at: usize,
    instr: &Instr,
    res: value::Result<Value>,
    fallback: impl FnOnce(&Fault) -> Value,
) -> Value {
    res.unwrap_or_else(|fault| {
        let value = fallback(&fault);
        warn!("{at}: {instr}: {fault}, using {value}");
        value
    })
}

fn lookup(labels: &HashMap<String, usize>, at: usize, instr: &Instr, label: &Operand) -> Result<usize> {
    let Some(name) = label.name() else {
        return Err(malformed(at, instr, "jump target is not a label"));
    };
    labels
        .get(name)
        .copied()
        .ok_or_else(|| Error::UnresolvedLabel {
            at,
            instr: instr.to_string(),
            label: name.to_string(),
        })
}

fn dest(at: usize, instr: &Instr) -> Result<&str> {
    instr
        .dest
        .name()
        .ok_or_else(|| malformed(at, instr, "destination is not a variable"))
}

fn malformed(at: usize, instr: &Instr, reason: &'static str) -> Error {
    Error::Malformed {
        at,
        instr: instr.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_program;
    use crate::parser::compile;

    fn load(ir: &str) -> Engine {
        Engine::new(parse_program(ir).unwrap(), Config::default()).unwrap()
    }

    fn run(engine: &mut Engine, input: &str) -> (Result<()>, String) {
        let mut output = Vec::new();
        let res = engine.run(&mut input.as_bytes(), &mut output);
        (res, String::from_utf8(output).unwrap())
    }

    fn run_source(body: &str, input: &str) -> (Engine, String) {
        let program = compile(&format!("int main() {{ {body} }}")).unwrap();
        let mut engine = Engine::new(program, Config::default()).unwrap();
        let (res, output) = run(&mut engine, input);
        res.unwrap();
        (engine, output)
    }

    #[test]
    fn straight_line_runs_each_instruction_once() {
        let mut engine = load(
            "(=, a, 2, _)
             (+, $t0, a, 3)
             (*, $t1, $t0, 2.5)
             (=, b, $t1, _)",
        );
        assert_eq!(engine.state(), State::Ready);
        run(&mut engine, "").0.unwrap();
        assert_eq!(engine.state(), State::Halted(Halt::Normal));
        assert_eq!(engine.executed(), 4);
        assert_eq!(engine.vars().get("b"), Some(&Value::Float(12.5)));
    }

    #[test]
    fn steps_move_through_states() {
        let mut engine = load("(=, a, 1, _)\n(=, a, 2, _)");
        let (mut input, mut output) = (&b""[..], Vec::new());
        assert!(engine.step(&mut input, &mut output).unwrap());
        assert_eq!(engine.state(), State::Running);
        assert_eq!(engine.ip(), 1);
        assert!(!engine.step(&mut input, &mut output).unwrap());
        assert_eq!(engine.state(), State::Halted(Halt::Normal));
        assert!(!engine.step(&mut input, &mut output).unwrap());
        assert_eq!(engine.executed(), 2);
    }

    #[test]
    fn labels_resolve_to_their_own_index() {
        let engine = load(
            "(JUMP, L1, _, _)
             (LABEL, L0, _, _)
             (=, a, 1, _)
             (LABEL, L1, _, _)
             (JUMP, L0, _, _)",
        );
        assert_eq!(engine.label("L0"), Some(1));
        assert_eq!(engine.label("L1"), Some(3));
        assert_eq!(engine.label("L2"), None);
    }

    #[test]
    fn forward_and_backward_jumps() {
        let mut engine = load(
            "(JUMP, Lfwd, _, _)
             (=, skipped, 1, _)
             (LABEL, Lfwd, _, _)
             (+, n, n, 1)
             (<, $t0, n, 3)
             (IF, $t0, Lfwd, Lout)
             (LABEL, Lout, _, _)",
        );
        run(&mut engine, "").0.unwrap();
        assert_eq!(engine.vars().get("skipped"), None);
        assert_eq!(engine.vars().get("n"), Some(&Value::Int(3)));
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let program = parse_program("(LABEL, L0, _, _)\n(LABEL, L0, _, _)").unwrap();
        let err = Engine::new(program, Config::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateLabel { first: 0, second: 1, .. }
        ));
    }

    #[test]
    fn unresolved_jump_label_is_rejected_before_the_run() {
        let program = parse_program(
            "(=, a, 1, _)
             (JUMP, nowhere, _, _)
             (=, a, 2, _)",
        )
        .unwrap();
        let err = Engine::new(program, Config::default()).unwrap_err();
        assert!(matches!(err, Error::UnresolvedLabel { at: 1, ref label, .. } if label == "nowhere"));
    }

    #[test]
    fn untaken_if_label_must_exist_too() {
        let program = parse_program(
            "(=, c, 1, _)
             (IF, c, Lok, Lmissing)
             (LABEL, Lok, _, _)
             (=, done, 1, _)",
        )
        .unwrap();
        let err = Engine::new(program, Config::default()).unwrap_err();
        assert!(matches!(err, Error::UnresolvedLabel { at: 1, ref label, .. } if label == "Lmissing"));
        assert_eq!(
            err.to_string(),
            "1: (IF, c, Lok, Lmissing): undefined label `Lmissing`"
        );
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let mut engine = load("(/, a, 1, 0)\n(HALT, _, _, _)\n(=, b, 1, _)");
        let err = run(&mut engine, "").0.unwrap_err();
        assert!(matches!(err, Error::UnknownOpcode { at: 1, ref op, .. } if op == "HALT"));
        assert_eq!(err.to_string(), "1: (HALT, _, _, _): unknown opcode `HALT`");
        assert_eq!(engine.vars().get("a"), Some(&Value::Int(0)));
        assert_eq!(engine.vars().get("b"), None);
    }

    #[test]
    fn operator_faults_recover_and_continue() {
        let mut engine = load(
            r#"(/, q, 7, 0)
               (%, r, 7.5, 0)
               (//, f, 1, 0)
               (*, s, "ab", 2)
               (<, c, 1, "1")
               (-, n, true, _)
               (=, done, 1, _)"#,
        );
        run(&mut engine, "").0.unwrap();
        let vars = engine.vars();
        assert_eq!(vars.get("q"), Some(&DIVISION_BY_ZERO_SENTINEL));
        assert_eq!(vars.get("r"), Some(&DIVISION_BY_ZERO_SENTINEL));
        assert_eq!(vars.get("f"), Some(&DIVISION_BY_ZERO_SENTINEL));
        assert_eq!(vars.get("s"), Some(&Value::Int(0)));
        assert_eq!(vars.get("c"), Some(&Value::Bool(false)));
        assert_eq!(vars.get("n"), Some(&Value::Int(0)));
        assert_eq!(vars.get("done"), Some(&Value::Int(1)));
    }

    #[test]
    fn unbound_names_read_as_zero() {
        let mut engine = load("(+, a, missing, 1)");
        run(&mut engine, "").0.unwrap();
        assert_eq!(engine.vars().get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn malformed_instructions() {
        let mut engine = load("(CALL, BEEP, 1, _)");
        let err = run(&mut engine, "").0.unwrap_err();
        assert!(matches!(err, Error::Malformed { reason: "unknown CALL target", .. }));
        let mut engine = load("(=, 5, 1, _)");
        let err = run(&mut engine, "").0.unwrap_err();
        assert!(matches!(err, Error::Malformed { reason: "destination is not a variable", .. }));
    }

    #[test]
    fn budget_stops_runaway_loops() {
        let program = compile("int main() { while (1) ; }").unwrap();
        let config = Config { budget: Some(100) };
        let mut engine = Engine::new(program, config).unwrap();
        let err = run(&mut engine, "").0.unwrap_err();
        assert!(matches!(err, Error::BudgetExhausted { budget: 100, .. }));
        assert_eq!(engine.executed(), 100);
        assert_eq!(engine.state(), State::Halted(Halt::Error));
    }

    #[test]
    fn budget_leaves_finishing_programs_alone() {
        let program = compile("int main() { int a; a = 2 + 3; }").unwrap();
        let len = program.len() as u64;
        let mut engine = Engine::new(program, Config { budget: Some(len) }).unwrap();
        run(&mut engine, "").0.unwrap();
        assert_eq!(engine.vars().get("a"), Some(&Value::Int(5)));
    }

    #[test]
    fn if_takes_first_label_when_truthy() {
        let (engine, _) = run_source("int a; a = 0; if (a == 0) { a = 1; } else { a = 2; }", "");
        assert_eq!(engine.vars().get("a"), Some(&Value::Int(1)));
        let (engine, _) = run_source("int a; a = 5; if (a == 0) { a = 1; } else { a = 2; }", "");
        assert_eq!(engine.vars().get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn print_expands_escapes_without_separators() {
        let (_, output) = run_source(
            r#"int a; a = 2 + 3; system.out.print("a = ", a, "\n", 1.5, "\t|");"#,
            "",
        );
        assert_eq!(output, "a = 5\n1.5\t|");
    }

    #[test]
    fn print_falls_back_to_second_operand() {
        let mut engine = load("(=, x, 7, _)\n(CALL, PRINT, _, x)");
        assert_eq!(run(&mut engine, "").1, "7");
    }

    #[test]
    fn scan_coerces_per_type() {
        let (engine, _) = run_source(
            "system.in.scan(int, x); system.in.scan(float, y); system.in.scan(string, s);",
            "42\n2.5\nhello world\n",
        );
        assert_eq!(engine.vars().get("x"), Some(&Value::Int(42)));
        assert_eq!(engine.vars().get("y"), Some(&Value::Float(2.5)));
        assert_eq!(engine.vars().get("s"), Some(&Value::Str("hello world".to_string())));
    }

    #[test]
    fn bad_or_missing_input_stores_zero_values() {
        let (engine, _) = run_source("system.in.scan(int, x); system.in.scan(float, y);", "abc\n");
        assert_eq!(engine.vars().get("x"), Some(&Value::Int(0)));
        assert_eq!(engine.vars().get("y"), Some(&Value::Float(0.0)));
    }
}
