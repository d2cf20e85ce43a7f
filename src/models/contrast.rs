//! Contrast expressions.
//!
//! A contrast is written against design column names, e.g.
//!
//! - `motor`
//! - `motor - music`
//! - `0.5*motor + 0.5*music - visual`
//!
//! and compiled to a weight vector over the design columns.

use nalgebra::DVector;

use crate::error::AppError;

/// A compiled contrast.
#[derive(Debug, Clone, PartialEq)]
pub struct Contrast {
    pub expression: String,
    /// BIDS-safe label used in output filenames (`MotorVsMusic`).
    pub name: String,
    pub weights: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Longest design column that starts `rest` and ends on a word boundary.
///
/// Lets names such as `left-hand` or `button press` be referenced even
/// though they contain operator characters.
fn match_column<'a>(rest: &str, columns: &'a [String]) -> Option<&'a str> {
    columns
        .iter()
        .filter(|c| !c.is_empty() && rest.starts_with(c.as_str()))
        .filter(|c| !rest[c.len()..].starts_with(is_word_char))
        .max_by_key(|c| c.len())
        .map(String::as_str)
}

fn tokenize(expr: &str, columns: &[String]) -> Result<Vec<Token>, AppError> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    while let Some(ch) = expr[pos..].chars().next() {
        let rest = &expr[pos..];
        if ch.is_whitespace() {
            pos += ch.len_utf8();
            continue;
        }
        if let Some(name) = match_column(rest, columns) {
            tokens.push(Token::Ident(name.to_string()));
            pos += name.len();
            continue;
        }
        match ch {
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            c if is_word_char(c) => {
                let word: String = rest.chars().take_while(|c| is_word_char(*c)).collect();
                pos += word.len();
                let starts_numeric = word.starts_with(|c: char| c.is_ascii_digit() || c == '.');
                match word.parse::<f64>() {
                    Ok(v) if starts_numeric => tokens.push(Token::Number(v)),
                    _ => tokens.push(Token::Ident(word)),
                }
                continue;
            }
            other => {
                return Err(AppError::invalid(format!(
                    "Contrast '{expr}': unexpected character '{other}'."
                )));
            }
        }
        pos += ch.len_utf8();
    }
    Ok(tokens)
}

/// Parse `expression` against the design `columns`.
pub fn parse_contrast(expression: &str, columns: &[String]) -> Result<Contrast, AppError> {
    // A bare column name is a unit contrast, whatever characters it holds.
    if let Some(idx) = columns.iter().position(|c| c == expression.trim()) {
        let mut weights = DVector::zeros(columns.len());
        weights[idx] = 1.0;
        return Ok(Contrast {
            expression: expression.to_string(),
            name: contrast_name(expression),
            weights,
        });
    }

    let tokens = tokenize(expression, columns)?;
    if tokens.is_empty() {
        return Err(AppError::invalid("Empty contrast expression."));
    }

    let mut weights = DVector::zeros(columns.len());
    let mut iter = tokens.into_iter().peekable();
    let mut first = true;

    while iter.peek().is_some() {
        let mut sign = 1.0;
        match iter.peek() {
            Some(Token::Plus) => {
                iter.next();
            }
            Some(Token::Minus) => {
                iter.next();
                sign = -1.0;
            }
            _ if first => {}
            _ => {
                return Err(AppError::invalid(format!(
                    "Contrast '{expression}': expected `+` or `-` between terms."
                )));
            }
        }
        first = false;

        let mut coefficient = 1.0;
        if let Some(Token::Number(v)) = iter.peek() {
            coefficient = *v;
            iter.next();
            if iter.next() != Some(Token::Star) {
                return Err(AppError::invalid(format!(
                    "Contrast '{expression}': expected `*` after coefficient {coefficient}."
                )));
            }
        }

        let name = match iter.next() {
            Some(Token::Ident(name)) => name,
            _ => {
                return Err(AppError::invalid(format!(
                    "Contrast '{expression}': expected a regressor name."
                )));
            }
        };
        let idx = columns.iter().position(|c| *c == name).ok_or_else(|| {
            AppError::invalid(format!(
                "Contrast '{expression}': unknown regressor `{name}` (available: {}).",
                columns.join(", ")
            ))
        })?;
        weights[idx] += sign * coefficient;
    }

    if weights.iter().all(|w| *w == 0.0) {
        return Err(AppError::invalid(format!("Contrast '{expression}' has all-zero weights.")));
    }

    Ok(Contrast {
        expression: expression.to_string(),
        name: contrast_name(expression),
        weights,
    })
}

/// Derive a filename label: `-` → `Vs`, `+` → `Plus`, other words capitalized.
pub fn contrast_name(expression: &str) -> String {
    expression
        .split_whitespace()
        .map(|part| match part {
            "-" => "Vs".to_string(),
            "+" => "Plus".to_string(),
            word => {
                let mut chars = word.chars();
                let capitalized: String = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                };
                capitalized.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
            }
        })
        .collect()
}

/// Every condition alone, then every pairwise difference.
pub fn default_contrasts(conditions: &[String]) -> Vec<String> {
    let mut out: Vec<String> = conditions.to_vec();
    for (i, a) in conditions.iter().enumerate() {
        for b in &conditions[i + 1..] {
            out.push(format!("{a} - {b}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        ["motor", "music", "visual", "rot_x", "intercept"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn single_condition() {
        let c = parse_contrast("motor", &columns()).unwrap();
        assert_eq!(c.weights.as_slice(), &[1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(c.name, "Motor");
    }

    #[test]
    fn difference_of_conditions() {
        let c = parse_contrast("motor - visual", &columns()).unwrap();
        assert_eq!(c.weights.as_slice(), &[1.0, 0.0, -1.0, 0.0, 0.0]);
        assert_eq!(c.name, "MotorVsVisual");
    }

    #[test]
    fn weighted_terms_without_spaces() {
        let c = parse_contrast("0.5*motor+0.5*music-visual", &columns()).unwrap();
        assert_eq!(c.weights.as_slice(), &[0.5, 0.5, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn unknown_regressor_is_rejected() {
        let err = parse_contrast("motor - dance", &columns()).unwrap_err();
        assert!(err.to_string().contains("dance"));
    }

    #[test]
    fn hyphenated_conditions_are_whole_names() {
        let columns: Vec<String> = ["left-hand", "right-hand", "left", "intercept"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let single = parse_contrast("left-hand", &columns).unwrap();
        assert_eq!(single.weights.as_slice(), &[1.0, 0.0, 0.0, 0.0]);

        let diff = parse_contrast("left-hand - right-hand", &columns).unwrap();
        assert_eq!(diff.weights.as_slice(), &[1.0, -1.0, 0.0, 0.0]);
        assert_eq!(diff.name, "LefthandVsRighthand");

        let weighted = parse_contrast("0.5*left-hand+0.5*right-hand-left", &columns).unwrap();
        assert_eq!(weighted.weights.as_slice(), &[0.5, 0.5, -1.0, 0.0]);
    }

    #[test]
    fn default_contrasts_parse_for_any_condition_names() {
        let conditions = vec!["button press".to_string(), "left-hand".to_string()];
        let mut columns = conditions.clone();
        columns.push("intercept".to_string());
        for expression in default_contrasts(&conditions) {
            parse_contrast(&expression, &columns).unwrap();
        }
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(parse_contrast("", &columns()).is_err());
        assert!(parse_contrast("motor music", &columns()).is_err());
        assert!(parse_contrast("2 motor", &columns()).is_err());
        assert!(parse_contrast("motor - motor", &columns()).is_err());
    }

    #[test]
    fn names_follow_bids_label_rules() {
        assert_eq!(contrast_name("music - visual"), "MusicVsVisual");
        assert_eq!(contrast_name("MOTOR + music"), "MotorPlusMusic");
        assert_eq!(contrast_name("rot_x"), "Rotx");
    }

    #[test]
    fn default_set_matches_bootcamp_contrasts() {
        let conditions = vec!["motor".to_string(), "music".to_string(), "visual".to_string()];
        assert_eq!(
            default_contrasts(&conditions),
            vec!["motor", "music", "visual", "motor - music", "motor - visual", "music - visual"]
        );
    }
}
