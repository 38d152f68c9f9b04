use renfa::{Nfa, compile};

use std::io::{self, Write};
use std::process;

fn parse_pattern(pattern: &str) -> Nfa {
    compile(pattern).unwrap_or_else(|e| {
        eprintln!("error: failed to parse pattern: {e}");
        process::exit(1);
    })
}

fn print_usage() {
    eprintln!(
        "\
Usage: renfa [OPTIONS] <PATTERN> [SUBJECT]

Matches SUBJECT against PATTERN, whole string, and prints the subject
when it matches. With no SUBJECT argument, one line is read from
standard input and trimmed of surrounding whitespace.

Options:
  --dot        Output DOT (Graphviz) representation of the NFA instead of matching
  -h, --help   Print this help message"
    );
}

enum Command {
    Dot {
        pattern: String,
    },
    Match {
        pattern: String,
        subject: Option<String>,
    },
}

fn parse_args() -> Command {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        process::exit(1);
    }

    let mut dot = false;
    let mut positional = Vec::new();

    for arg in &args {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "--dot" => {
                dot = true;
            }
            other if other.starts_with('-') => {
                eprintln!("error: unknown option: {other}");
                print_usage();
                process::exit(1);
            }
            _ => {
                positional.push(arg.clone());
            }
        }
    }

    if dot {
        if positional.len() != 1 {
            eprintln!("error: --dot takes exactly one pattern argument");
            print_usage();
            process::exit(1);
        }
        Command::Dot {
            pattern: positional[0].clone(),
        }
    } else {
        match positional.len() {
            1 => Command::Match {
                pattern: positional[0].clone(),
                subject: None,
            },
            2 => Command::Match {
                pattern: positional[0].clone(),
                subject: Some(positional[1].clone()),
            },
            _ => {
                eprintln!("error: expected a pattern and an optional subject");
                print_usage();
                process::exit(1);
            }
        }
    }
}

fn run_dot(pattern: &str) {
    let nfa = parse_pattern(pattern);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    nfa.to_dot(&mut out);
    out.flush().unwrap();
}

fn read_subject_line() -> String {
    let mut line = String::new();
    io::stdin().read_line(&mut line).unwrap_or_else(|e| {
        eprintln!("error: failed to read subject from stdin: {e}");
        process::exit(1);
    });
    line.trim().to_string()
}

fn run_match(pattern: &str, subject: Option<String>) {
    let nfa = parse_pattern(pattern);
    let subject = match subject {
        Some(subject) => subject,
        None => read_subject_line(),
    };
    if nfa.is_match(&subject) {
        println!("{subject}");
    }
}

fn main() {
    match parse_args() {
        Command::Dot { pattern } => run_dot(&pattern),
        Command::Match { pattern, subject } => run_match(&pattern, subject),
    }
}
