//! Front-end checks the host backend applies when "compiling" a module.
//!
//! The host backend never generates code; it validates the unit the way a
//! device compiler's front end would reject it, and records the kernel entry
//! points the unit declares so that linking and kernel creation can be
//! checked.

/// Validate `source` and return the kernel entry points it declares.
///
/// On failure returns a compiler-style diagnostic log.
pub(crate) fn scan_unit(label: &str, source: &[u8]) -> Result<Vec<String>, String> {
    let text = std::str::from_utf8(source).map_err(|e| {
        format!(
            "{label}: error: source is not valid UTF-8 text (invalid byte at offset {})",
            e.valid_up_to()
        )
    })?;
    let code = strip_comments(text);

    let mut diagnostics = Vec::new();
    for (n, line) in code.lines().enumerate() {
        let directive = line.trim_start();
        if let Some(rest) = directive.strip_prefix("#error") {
            diagnostics.push(format!("{label}:{}: error: #error{rest}", n + 1));
        }
    }
    match check_balance(label, &code) {
        Ok(()) => {
            if let Err(msg) = check_declarations(label, &code) {
                diagnostics.push(msg);
            }
        }
        Err(msg) => diagnostics.push(msg),
    }
    if !diagnostics.is_empty() {
        return Err(diagnostics.join("\n"));
    }

    Ok(kernel_entry_points(&code))
}

/// Replace comments with nothing, keeping newlines so line numbers survive.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for c in chars.by_ref() {
                        if c == '\n' {
                            out.push('\n');
                        }
                        if prev == '*' && c == '/' {
                            break;
                        }
                        prev = c;
                    }
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

fn check_balance(label: &str, code: &str) -> Result<(), String> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for (n, line) in code.lines().enumerate() {
        for c in line.chars() {
            match c {
                '{' | '(' => stack.push((c, n + 1)),
                '}' | ')' => {
                    let open = if c == '}' { '{' } else { '(' };
                    match stack.pop() {
                        Some((o, _)) if o == open => {}
                        _ => return Err(format!("{label}:{}: error: unmatched '{c}'", n + 1)),
                    }
                }
                _ => {}
            }
        }
    }
    match stack.pop() {
        Some((c, line)) => Err(format!("{label}:{line}: error: unterminated '{c}'")),
        None => Ok(()),
    }
}

/// Every top-level construct must end in `;` or a `{ ... }` body.
///
/// Preprocessor lines are skipped, continuations included. Expects balanced
/// braces.
fn check_declarations(label: &str, code: &str) -> Result<(), String> {
    let mut depth = 0usize;
    // Line where the unterminated top-level text started.
    let mut pending: Option<usize> = None;
    let mut continued = false;
    for (n, line) in code.lines().enumerate() {
        let directive = continued || (depth == 0 && line.trim_start().starts_with('#'));
        if directive {
            continued = line.trim_end().ends_with('\\');
            continue;
        }
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        pending = None;
                    }
                }
                ';' if depth == 0 => pending = None,
                c if depth == 0 && !c.is_whitespace() => {
                    pending.get_or_insert(n + 1);
                }
                _ => {}
            }
        }
    }
    match pending {
        Some(line) => Err(format!(
            "{label}:{line}: error: expected ';' at end of declaration"
        )),
        None => Ok(()),
    }
}

/// Names following `__kernel void` or `kernel void`.
fn kernel_entry_points(code: &str) -> Vec<String> {
    let tokens: Vec<&str> = code
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect();
    tokens
        .windows(3)
        .filter(|w| (w[0] == "__kernel" || w[0] == "kernel") && w[1] == "void")
        .map(|w| w[2].to_string())
        .collect()
}
