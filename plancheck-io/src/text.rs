/// 清理 TEXT/MTEXT 内容中的格式控制码，合并空白并去掉首尾空格。
///
/// `\P`、`\X`、`\~` 视为空格；`\\`、`\{`、`\}` 保留字面字符；`\U+XXXX` 解码为
/// Unicode 字符；开关类代码（`\L`、`\O`、`\K` 等）直接丢弃；带参数的代码
/// （`\f…;`、`\H…;`、`\S…;` 等）连同参数一起丢弃；`%%c`、`%%d`、`%%p`
/// 转换为对应符号。
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('P' | 'X' | '~') => out.push(' '),
                Some(literal @ ('\\' | '{' | '}')) => out.push(literal),
                Some(u @ ('U' | 'u')) => {
                    if chars.peek() == Some(&'+') {
                        chars.next();
                        let mut hex = String::new();
                        while hex.len() < 4 {
                            match chars.peek() {
                                Some(c) if c.is_ascii_hexdigit() => {
                                    hex.push(*c);
                                    chars.next();
                                }
                                _ => break,
                            }
                        }
                        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                            Some(decoded) => out.push(decoded),
                            None => {
                                out.push(u);
                                out.push('+');
                                out.push_str(&hex);
                            }
                        }
                    } else {
                        out.push(u);
                    }
                }
                Some('L' | 'l' | 'O' | 'o' | 'K' | 'k' | 'N') => {}
                Some('f' | 'F' | 'A' | 'C' | 'c' | 'H' | 'Q' | 'W' | 'T' | 'S' | 'p') => {
                    for next in chars.by_ref() {
                        if next == ';' {
                            break;
                        }
                    }
                }
                Some(other) => out.push(other),
                None => {}
            },
            '{' | '}' => {}
            '%' if chars.peek() == Some(&'%') => {
                chars.next();
                match chars.next() {
                    Some('c' | 'C') => out.push('\u{2300}'),
                    Some('d' | 'D') => out.push('\u{00B0}'),
                    Some('p' | 'P') => out.push('\u{00B1}'),
                    Some('%') => out.push('%'),
                    Some(other) => {
                        out.push_str("%%");
                        out.push(other);
                    }
                    None => out.push_str("%%"),
                }
            }
            _ => out.push(ch),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_mtext_formatting() {
        assert_eq!(
            clean_text(r"{\fArial|b1|i0|c0|p34;\H2.5;MASTER\PBEDROOM}"),
            "MASTER BEDROOM"
        );
        assert_eq!(clean_text(r"\LKITCHEN\l"), "KITCHEN");
        assert_eq!(clean_text(r"\A1;\C7;MAIN  HALL "), "MAIN HALL");
    }

    #[test]
    fn drops_stacked_fractions_and_keeps_escapes() {
        assert_eq!(clean_text(r"WC \S1/2;"), "WC");
        assert_eq!(clean_text(r"A\\B \{x\}"), r"A\B {x}");
    }

    #[test]
    fn decodes_unicode_and_percent_codes() {
        assert_eq!(clean_text(r"\U+0645\U+0637\U+0628\U+062E"), "مطبخ");
        assert_eq!(clean_text("45%%d"), "45°");
        assert_eq!(clean_text("%%c100"), "\u{2300}100");
        assert_eq!(clean_text("100%%%"), "100%");
    }

    #[test]
    fn whitespace_only_becomes_empty() {
        assert_eq!(clean_text(r"  \P  "), "");
    }
}
