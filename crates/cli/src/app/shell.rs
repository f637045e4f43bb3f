/// Splits a shell line into words. Single or double quotes group words
/// (`add --description "Café da manhã"`); there are no escapes.
pub fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err("aspas não fechadas".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words() {
        assert_eq!(split_line("  delete  abc ").unwrap(), vec!["delete", "abc"]);
        assert!(split_line("   ").unwrap().is_empty());
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            split_line(r#"add --description "Café da manhã" --amount '12.50'"#).unwrap(),
            vec!["add", "--description", "Café da manhã", "--amount", "12.50"]
        );
        assert_eq!(
            split_line(r#"edit x --description """#).unwrap(),
            vec!["edit", "x", "--description", ""]
        );
    }

    #[test]
    fn unterminated_quote() {
        assert!(split_line(r#"add --description "Café"#).is_err());
    }
}
