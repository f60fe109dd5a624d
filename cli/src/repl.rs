use moonbridge::{BridgeError, Script, ScriptValue};
use rustyline::{DefaultEditor, error::ReadlineError};

/// Global that holds the value of the last bare expression.
const LAST: &str = "_";

fn print_repl_help() {
    eprintln!("Commands: :get PATH, :fields PATH, :quit | :exit | :q, :help");
}

pub(crate) fn should_continue_multiline(buf: &str) -> bool {
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    for ch in buf.chars() {
        match ch {
            '(' => paren += 1,
            ')' => paren -= 1,
            '{' => brace += 1,
            '}' => brace -= 1,
            '[' => bracket += 1,
            ']' => bracket -= 1,
            _ => {}
        }
    }
    let trailing_backslash = buf.trim_end().ends_with('\\');
    paren > 0 || brace > 0 || bracket > 0 || trailing_backslash
}

pub(crate) enum Command<'a> {
    Quit,
    Help,
    Get(&'a str),
    Fields(&'a str),
    Unknown,
}

pub(crate) fn parse_command(line: &str) -> Option<Command<'_>> {
    let rest = line.strip_prefix(':')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    Some(match (name, arg) {
        ("quit" | "exit" | "q", _) => Command::Quit,
        ("help", _) => Command::Help,
        ("get", path) if !path.is_empty() => Command::Get(path),
        ("fields", path) if !path.is_empty() => Command::Fields(path),
        _ => Command::Unknown,
    })
}

fn show(script: &Script, path: &str) {
    match script.get::<ScriptValue>(path) {
        Ok(value) => println!("{}", value),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn show_fields(script: &Script, path: &str) {
    match script.fields(path) {
        Ok(fields) => {
            for (name, kind) in fields {
                println!("{}\t{}", name, kind);
            }
        }
        Err(e) => eprintln!("Error: {}", e),
    }
}

/// Runs `src` as statements; input that does not parse as statements is
/// evaluated as an expression and printed.
fn eval(script: &Script, src: &str) {
    let result = match script.run(src) {
        Err(BridgeError::ScriptLoad { .. }) => {
            let wrapped = format!("{} = ({})", LAST, src);
            match script.run(&wrapped) {
                Ok(()) => {
                    show(script, LAST);
                    return;
                }
                Err(BridgeError::ScriptLoad { .. }) => script.run(src),
                Err(e) => Err(e),
            }
        }
        other => other,
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }
}

pub fn run(script: &Script) -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new()?;

    print_repl_help();

    loop {
        let mut acc = String::new();
        loop {
            let prompt = if acc.is_empty() { "> " } else { "... " };
            match rl.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim_end();

                    // commands only when starting fresh
                    if acc.is_empty() {
                        match parse_command(trimmed.trim_start()) {
                            Some(Command::Quit) => return Ok(()),
                            Some(Command::Help) => {
                                print_repl_help();
                                break;
                            }
                            Some(Command::Get(path)) => {
                                show(script, path);
                                break;
                            }
                            Some(Command::Fields(path)) => {
                                show_fields(script, path);
                                break;
                            }
                            Some(Command::Unknown) => {
                                eprintln!("Unknown command. Type :help for help.");
                                break;
                            }
                            None => {}
                        }
                    }

                    if let Some(head) = trimmed.strip_suffix('\\') {
                        acc.push_str(head);
                        acc.push('\n');
                        continue;
                    }

                    acc.push_str(trimmed);
                    acc.push('\n');
                    if !should_continue_multiline(&acc) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    acc.clear();
                    eprintln!("^C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    if acc.trim().is_empty() {
                        println!();
                        return Ok(());
                    }
                    break;
                }
                Err(e) => {
                    eprintln!("Readline error: {}", e);
                    continue;
                }
            }
        }

        let src = acc.trim_end();
        if src.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(src);
        eval(script, src);
    }
}
