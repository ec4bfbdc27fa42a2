use tacvm::engine::{Config, Engine, Error, Halt, State};
use tacvm::ir::{self, Listing, Opcode};
use tacvm::parser::compile;
use tacvm::value::Value;

fn execute(source: &str, input: &str) -> (Engine, String) {
    let program = compile(source).unwrap();
    let mut engine = Engine::new(program, Config::default()).unwrap();
    let mut output = Vec::new();
    engine.run(&mut input.as_bytes(), &mut output).unwrap();
    (engine, String::from_utf8(output).unwrap())
}

fn var(engine: &Engine, name: &str) -> Value {
    engine.vars().get(name).cloned().unwrap()
}

#[test]
fn addition() {
    let (engine, _) = execute("int main() { int a; a = 2 + 3; }", "");
    assert_eq!(var(&engine, "a"), Value::Int(5));
    assert_eq!(engine.state(), State::Halted(Halt::Normal));
}

#[test]
fn while_runs_body_three_times() {
    let source = "int main() { int a, n; a = 0; while (a < 3) { a = a + 1; n += 1; } }";
    let (engine, _) = execute(source, "");
    assert_eq!(var(&engine, "a"), Value::Int(3));
    assert_eq!(var(&engine, "n"), Value::Int(3));
}

#[test]
fn for_with_break_and_continue() {
    let source = r#"
        int main() {
            int i, sum;
            for (i = 0; i < 100; i += 1) {
                if (i % 2 == 1) continue;
                if (i > 10) break;
                sum += i;
            }
            system.out.print(sum, " ", i);
        }
    "#;
    let (_, output) = execute(source, "");
    assert_eq!(output, "30 12");
}

#[test]
fn nested_loops() {
    let source = r#"
        int main() {
            int i, j, count;
            i = 0;
            while (i < 4) {
                for (j = 0; j < i; j += 1) count += 1;
                i += 1;
            }
        }
    "#;
    let (engine, _) = execute(source, "");
    assert_eq!(var(&engine, "count"), Value::Int(6));
}

#[test]
fn scan_then_print() {
    let source = r#"
        int main() {
            int x;
            float half;
            string name;
            system.in.scan(int, x);
            system.in.scan(string, name);
            half = x / 2.0;
            system.out.print("hi ", name, ": ", x * 2, ", ", half, "\n");
        }
    "#;
    let (engine, output) = execute(source, "42\nada\n");
    assert_eq!(var(&engine, "x"), Value::Int(42));
    assert_eq!(output, "hi ada: 84, 21.0\n");
}

#[test]
fn string_concatenation_keeps_escapes_until_print() {
    let source = r#"int main() { string s; s = "n=" + 3 + "\n"; system.out.print(s); }"#;
    let (engine, output) = execute(source, "");
    assert_eq!(var(&engine, "s"), Value::Str("n=3\\n".to_string()));
    assert_eq!(output, "n=3\n");
}

#[test]
fn number_literal_forms() {
    let source = "int main() { a = 0x10 + 010 + 1.5e1 - 2.; }";
    let (engine, _) = execute(source, "");
    assert_eq!(var(&engine, "a"), Value::Float(37.0));
}

#[test]
fn comments_are_ignored() {
    let source = "int main() { // line\n a = 1; /* block\n a = 2; */ }";
    let (engine, _) = execute(source, "");
    assert_eq!(var(&engine, "a"), Value::Int(1));
}

#[test]
fn division_by_zero_does_not_stop_the_run() {
    let source = "int main() { int a, b; a = 10 / b; b = 1; }";
    let (engine, _) = execute(source, "");
    assert_eq!(var(&engine, "a"), Value::Int(0));
    assert_eq!(var(&engine, "b"), Value::Int(1));
}

#[test]
fn syntax_error_produces_no_program() {
    let err = compile("int main() { int a; if (a == 0 { a = 1; } }").unwrap_err();
    assert_eq!(err.expected, "CLOSE_PAREN");
    assert_eq!(err.line, 1);
}

#[test]
fn compiled_ir_reads_back_and_runs_the_same() {
    let source = r#"
        int main() {
            int i;
            for (i = 0; i < 3; i += 1) system.out.print(i, ",");
        }
    "#;
    let program = compile(source).unwrap();
    let text = Listing(&program).to_string();
    let reloaded = ir::parse_program(&text).unwrap();
    assert_eq!(reloaded, program);

    let mut engine = Engine::new(reloaded, Config::default()).unwrap();
    let mut output = Vec::new();
    engine.run(&mut &b""[..], &mut output).unwrap();
    assert_eq!(output, b"0,1,2,");
}

#[test]
fn bool_words_mean_the_same_after_reloading() {
    let source = "int main() { int a; if (true) a = 1; else a = 2; b = !false; }";
    let program = compile(source).unwrap();
    let reloaded = ir::parse_program(&Listing(&program).to_string()).unwrap();
    assert_eq!(reloaded, program);

    let mut engine = Engine::new(reloaded, Config::default()).unwrap();
    engine.run(&mut &b""[..], &mut Vec::new()).unwrap();
    assert_eq!(var(&engine, "a"), Value::Int(1));
    assert_eq!(var(&engine, "b"), Value::Bool(true));
}

#[test]
fn out_of_range_float_literal_is_rejected() {
    let err = compile("int main() { float f; f = 1e999; }").unwrap_err();
    assert_eq!(err.expected, "literal in range");
    assert_eq!(err.found, "SCIENTIFIC_FLOAT `1e999`");
}

#[test]
fn missing_else_label_in_hand_written_ir() {
    let program = ir::parse_program(
        "(=, c, 1, _)
         (IF, c, Lok, Lmissing)
         (LABEL, Lok, _, _)
         (=, done, 1, _)",
    )
    .unwrap();
    let err = Engine::new(program, Config::default()).unwrap_err();
    assert!(matches!(err, Error::UnresolvedLabel { ref label, .. } if label == "Lmissing"));
}

#[test]
fn hand_written_ir_with_unknown_opcode() {
    let program = ir::parse_program(
        "(CALL, PRINT, \"before\", _)
         (STOP, _, _, _)
         (CALL, PRINT, \"after\", _)",
    )
    .unwrap();
    assert_eq!(program[1].op, Opcode::Unknown("STOP".to_string()));
    let mut engine = Engine::new(program, Config::default()).unwrap();
    let mut output = Vec::new();
    let err = engine.run(&mut &b""[..], &mut output).unwrap_err();
    assert!(matches!(err, Error::UnknownOpcode { at: 1, .. }));
    assert_eq!(output, b"before");
    assert_eq!(engine.state(), State::Halted(Halt::Error));
}

#[test]
fn long_loops_run_without_a_budget() {
    let source = "int main() { int i; while (i < 50000) i += 1; }";
    let (engine, _) = execute(source, "");
    assert_eq!(var(&engine, "i"), Value::Int(50000));
}
