use formulaxp::builtinops::default_global;
use formulaxp::{Map, Value, calculate};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::process;

fn main() {
    if let Err(err) = run_repl() {
        eprintln!("formulaxp: {err}");
        process::exit(1);
    }
}

fn run_repl() -> rustyline::Result<()> {
    println!("FormulaXP Expression Evaluator");
    println!("Enter expressions like: (20+10)*3/2-3");
    println!("Assignments persist across lines: total = price * 2");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;
    let scope = Map::new();

    loop {
        let line = match rl.readline("formulaxp> ") {
            Ok(line) => line,
            // Ctrl+C and Ctrl+D end the session cleanly.
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(err) => return Err(err),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        match line {
            ":help" => {
                print_help();
                continue;
            }
            ":env" => {
                print_environment(&scope);
                continue;
            }
            ":quit" | ":exit" => break,
            _ => {}
        }

        match calculate(line, &scope) {
            Ok(Value::None) => {}
            Ok(result) => println!("{result}"),
            Err(e) => println!("Error: {e}"),
        }
    }
    println!("Goodbye!");
    Ok(())
}

fn print_help() {
    println!("FormulaXP interactive calculator:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current variable bindings");
    println!("  :quit      - Exit the calculator");
    println!("  :exit      - Exit the calculator");
    println!("  Ctrl+C     - Exit the calculator");
    println!();
    println!("Supported syntax:");
    println!("  Numbers: 42, 0x2A, 3.14, 1e-3");
    println!("  Strings: 'single' or \"double\" quoted");
    println!("  Containers: [1, 2, 3] and {{'key': 'value'}}");
    println!("  Arithmetic: +, -, *, /, %, **, <<, >>");
    println!("  Comparison: <, <=, >, >=, ==, !=");
    println!("  Logic: &&, ||, !");
    println!("  Assignment: x = 10, m.key = 'value', l[0] = 1");
    println!("  Calls: sqrt(4), pow(2, 'exp': 3), [1, 2].len()");
    println!("  Comments: # line and /* block */");
    println!();
    println!("Examples:");
    println!("  (20+10)*3/2-3");
    println!("  'the tests %s %s' % ('are', 'working')");
    println!("  total = sum(1, 2, 3, 4)");
    println!();
}

fn print_environment(scope: &Map) {
    let user_defined = scope.keys();
    let builtins = default_global().keys();

    if !builtins.is_empty() {
        println!("Global functions ({}):", builtins.len());
        let mut col = 0;
        for name in builtins {
            print!("  {name:<10}");
            col += 1;
            if col % 6 == 0 {
                println!();
            }
        }
        if col % 6 != 0 {
            println!();
        }
        println!();
    }

    if user_defined.is_empty() {
        println!("No user-defined values yet.");
        return;
    }
    println!("User-defined values ({}):", user_defined.len());
    for name in user_defined {
        if let Some(value) = scope.get(&name) {
            println!("  {name} = {value}");
        }
    }
}
