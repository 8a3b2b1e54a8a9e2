//! Scene Description Parser

use crate::error::SceneError;
use crate::object::*;
use rcore::fileutil::file_to_string;
use rcore::math::Float;
use pest::Parser;
use std::collections::HashMap;

/// The `pest` parser generated from a grammar.
#[derive(Parser)]
#[grammar = "parser/scene.pest"]
struct RadParser;

/// A word of input and the line it starts on.
#[derive(Copy, Clone, Debug)]
struct Word<'a> {
    text: &'a str,
    line: usize,
}

/// Parses Radiance style `modifier type identifier` records:
///
/// ```text
/// void plastic red_plastic
/// 0
/// 0
/// 5 .7 .05 .05 .05 .05
/// ```
///
/// Modifiers must be defined before use. A name that is defined again refers
/// to the newest definition from then on. Several files may be parsed into the
/// same parser and share one namespace.
#[derive(Debug, Default)]
pub struct SceneParser {
    /// Records parsed so far.
    objects: Vec<ObjectRecord>,

    /// Latest definition of each name.
    names: HashMap<String, ObjId>,
}

impl SceneParser {
    /// Returns a new empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a scene description file.
    ///
    /// * `path` - The file path.
    pub fn parse_file(&mut self, path: &str) -> Result<(), SceneError> {
        let text = file_to_string(path).map_err(SceneError::Read)?;
        self.parse_str(&text).map_err(|err| match err {
            SceneError::Syntax(msg) => SceneError::Syntax(format!("{}: {}", path, msg)),
            other => other,
        })?;
        info!("Parsed '{}', {} objects total", path, self.objects.len());
        Ok(())
    }

    /// Parse scene description text. On failure nothing from `text` is kept.
    ///
    /// * `text` - The scene description.
    pub fn parse_str(&mut self, text: &str) -> Result<(), SceneError> {
        let words = tokenize(text)?;
        let n_objects = self.objects.len();
        let names = self.names.clone();

        let result = self.parse_words(&words);
        if result.is_err() {
            self.objects.truncate(n_objects);
            self.names = names;
        }
        result
    }

    /// Returns the records parsed so far.
    pub fn objects(&self) -> &[ObjectRecord] {
        &self.objects
    }

    /// Consume the parser and return the records.
    pub fn into_objects(self) -> Vec<ObjectRecord> {
        self.objects
    }

    /// Parse records from a word sequence.
    ///
    /// * `words` - The words.
    fn parse_words(&mut self, words: &[Word]) -> Result<(), SceneError> {
        let mut it = words.iter().copied();

        while let Some(modifier) = it.next() {
            let type_word = next_word(&mut it, "primitive type")?;
            let id = next_word(&mut it, "identifier")?;

            let modifier_id = match modifier.text {
                "void" => None,
                name => match self.names.get(name) {
                    Some(&m) => Some(m),
                    None => {
                        return Err(SceneError::UnresolvedModifier {
                            name: name.to_string(),
                            line: modifier.line,
                        })
                    }
                },
            };

            if type_word.text == "alias" {
                let original = next_word(&mut it, "aliased identifier")?;
                match self.names.get(original.text) {
                    Some(&target) => {
                        self.names.insert(id.text.to_string(), target);
                        continue;
                    }
                    None => {
                        return Err(SceneError::UnresolvedModifier {
                            name: original.text.to_string(),
                            line: original.line,
                        })
                    }
                }
            }

            let kind = ObjectKind::from_name(type_word.text).ok_or_else(|| SceneError::UnknownType {
                name: type_word.text.to_string(),
                line: type_word.line,
            })?;

            let n_str = next_count(&mut it, "string argument count")?;
            let mut sargs = Vec::with_capacity(n_str);
            for _ in 0..n_str {
                sargs.push(next_word(&mut it, "string argument")?.text.to_string());
            }

            // Integer arguments are not used by any kind but are skipped.
            let n_int = next_count(&mut it, "integer argument count")?;
            for _ in 0..n_int {
                let w = next_word(&mut it, "integer argument")?;
                w.text.parse::<i64>().map_err(|_| syntax(w, "integer"))?;
            }

            let n_real = next_count(&mut it, "real argument count")?;
            let mut rargs = Vec::with_capacity(n_real);
            for _ in 0..n_real {
                let w = next_word(&mut it, "real argument")?;
                rargs.push(w.text.parse::<Float>().map_err(|_| syntax(w, "real number"))?);
            }

            let obj_id = self.objects.len() as ObjId;
            let record = ObjectRecord::new(obj_id, modifier_id, kind, id.text, sargs, rargs)?;
            trace!("{} {} '{}'", modifier.text, kind, id.text);

            self.names.insert(id.text.to_string(), obj_id);
            self.objects.push(record);
        }

        Ok(())
    }
}

/// Split text into words, dropping comments.
///
/// * `text` - The scene description.
fn tokenize(text: &str) -> Result<Vec<Word>, SceneError> {
    let scene = RadParser::parse(Rule::scene, text)
        .map_err(|err| SceneError::Syntax(err.to_string()))?
        .next()
        .ok_or_else(|| SceneError::Syntax(String::from("empty parse")))?;

    let mut words = vec![];
    for pair in scene.into_inner() {
        let line = pair.as_span().start_pos().line_col().0;
        match pair.as_rule() {
            Rule::word => words.push(Word {
                text: pair.as_str(),
                line,
            }),
            Rule::command => {
                return Err(SceneError::Unsupported(format!(
                    "line {}: inline command '{}'",
                    line,
                    pair.as_str()
                )))
            }
            Rule::EOI => (), // Done
            _ => unreachable!(),
        }
    }
    Ok(words)
}

/// Returns the next word or a syntax error naming what was expected.
fn next_word<'a, I>(it: &mut I, what: &str) -> Result<Word<'a>, SceneError>
where
    I: Iterator<Item = Word<'a>>,
{
    it.next()
        .ok_or_else(|| SceneError::Syntax(format!("unexpected end of input, expected {}", what)))
}

/// Returns the next word parsed as an argument count.
fn next_count<'a, I>(it: &mut I, what: &str) -> Result<usize, SceneError>
where
    I: Iterator<Item = Word<'a>>,
{
    let w = next_word(it, what)?;
    w.text.parse::<usize>().map_err(|_| syntax(w, what))
}

fn syntax(w: Word, what: &str) -> SceneError {
    SceneError::Syntax(format!("line {}: expected {}, found '{}'", w.line, what, w.text))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM: &str = "
        # A red material and a ball.
        void plastic red
        0
        0
        5 .7 .05 .05 .05 .05

        red sphere ball
        0 0 4 0 0 0 1   # centre and radius
    ";

    #[test]
    fn records_are_parsed_with_modifiers() {
        let mut p = SceneParser::new();
        p.parse_str(ROOM).unwrap();
        let objs = p.objects();
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[0].kind, ObjectKind::Plastic);
        assert_eq!(objs[0].modifier, None);
        assert_eq!(objs[0].rargs, vec![0.7, 0.05, 0.05, 0.05, 0.05]);
        assert_eq!(objs[1].kind, ObjectKind::Sphere);
        assert_eq!(objs[1].modifier, Some(0));
        assert_eq!(objs[1].name, "ball");
    }

    #[test]
    fn undefined_modifier_reports_line() {
        let mut p = SceneParser::new();
        let err = p.parse_str("\n\nblue sphere s 0 0 4 0 0 0 1").unwrap_err();
        assert!(matches!(err, SceneError::UnresolvedModifier { ref name, line: 3 } if name == "blue"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut p = SceneParser::new();
        let err = p.parse_str("void mesh m 1 m.rtm 0 0").unwrap_err();
        assert!(matches!(err, SceneError::UnknownType { ref name, .. } if name == "mesh"));
    }

    #[test]
    fn truncated_record_is_a_syntax_error() {
        let mut p = SceneParser::new();
        assert!(matches!(
            p.parse_str("void light l 0 0 3 1 1"),
            Err(SceneError::Syntax(_))
        ));
    }

    #[test]
    fn failed_parse_keeps_earlier_records() {
        let mut p = SceneParser::new();
        p.parse_str(ROOM).unwrap();
        assert!(p.parse_str("void light l 0 0 3 1 1 1  l sphere s 0 0 3 1 2 3").is_err());
        assert_eq!(p.objects().len(), 2);
        assert!(p.parse_str("l sphere s 0 0 4 0 0 0 1").is_err());
    }

    #[test]
    fn inline_commands_are_unsupported() {
        let mut p = SceneParser::new();
        assert!(matches!(
            p.parse_str("!genbox red box 1 1 1"),
            Err(SceneError::Unsupported(_))
        ));
    }

    #[test]
    fn aliases_resolve_to_original() {
        let mut p = SceneParser::new();
        p.parse_str(ROOM).unwrap();
        p.parse_str("void alias paint red\npaint sphere b2 0 0 4 1 1 1 1").unwrap();
        assert_eq!(p.objects()[2].modifier, Some(0));
    }

    #[test]
    fn redefinition_uses_newest() {
        let mut p = SceneParser::new();
        p.parse_str("void light m 0 0 3 1 1 1\nvoid light m 0 0 3 2 2 2\nm sphere s 0 0 4 0 0 0 1")
            .unwrap();
        assert_eq!(p.objects()[2].modifier, Some(1));
    }
}
