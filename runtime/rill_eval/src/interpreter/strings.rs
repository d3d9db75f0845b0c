//! String, path and URL interpolation.
//!
//! Literal template text is written by the module author and trusted;
//! interpolated values are not. Injection prevention rejects, per
//! interpolation site:
//!
//! - paths: `?`, `#`, `\`, and parent-directory sequences in any
//!   encoding (`..`, `%2E`, `%2e`, including sequences assembled across
//!   a segment boundary),
//! - path patterns: additionally `*`,
//! - URL paths: `?`, `#`, `*`, `\` and backtracking sequences,
//! - URL query values: `&`, `#`.
//!
//! Checked strings are validated against their named pattern before
//! being produced.

use rill_ir::{Name, NodeId, QueryParam, StrSegment};
use rill_values::Value;

use crate::errors::{EvalErrorKind, EvalResult, EvalSignal};
use crate::interpreter::Evaluator;

/// One rendered character, tagged with its provenance.
type TaggedChar = (char, bool);

impl Evaluator {
    /// Render an interpolated value. Only string-like and numeric values
    /// may be interpolated.
    fn interpolation_to_string(&mut self, id: NodeId, node: NodeId) -> Result<String, EvalSignal> {
        let value = self.eval_node(node)?;
        match &value {
            Value::Str(s) => Ok((**s).clone()),
            Value::Int(n) => Ok(n.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Rune(c) => Ok(c.to_string()),
            Value::Path(p) => Ok((**p).clone()),
            Value::Identifier(i) => Ok((**i).clone()),
            Value::PropertyName(p) => Ok((**p).clone()),
            _ => Err(self.error(
                id,
                EvalErrorKind::TypeMismatch {
                    expected: "string-like value".into(),
                    got: value.type_name().into(),
                },
                format!("cannot interpolate a {}", value.type_name()),
            )),
        }
    }

    /// Render segments into provenance-tagged characters.
    fn render_segments(
        &mut self,
        id: NodeId,
        segments: &[StrSegment],
    ) -> Result<Vec<TaggedChar>, EvalSignal> {
        let mut rendered = Vec::new();
        for segment in segments {
            match segment {
                StrSegment::Literal(text) => {
                    rendered.extend(text.chars().map(|c| (c, false)));
                }
                StrSegment::Interpolation(node) => {
                    let text = self.interpolation_to_string(id, *node)?;
                    rendered.extend(text.chars().map(|c| (c, true)));
                }
            }
        }
        Ok(rendered)
    }

    fn eval_path_like(
        &mut self,
        id: NodeId,
        segments: &[StrSegment],
        reject_glob: bool,
    ) -> Result<String, EvalSignal> {
        let rendered = self.render_segments(id, segments)?;
        for (c, interpolated) in &rendered {
            if !interpolated {
                continue;
            }
            if matches!(*c, '?' | '#' | '\\') {
                return Err(self.error(
                    id,
                    EvalErrorKind::PathInterpolationForbiddenChar(*c),
                    format!("`{c}` is not allowed in a path interpolation"),
                ));
            }
            if reject_glob && *c == '*' {
                return Err(self.error(
                    id,
                    EvalErrorKind::PathPatternInterpolationGlob,
                    "`*` is not allowed in an interpolated path pattern segment",
                ));
            }
        }
        if has_interpolated_parent_dir(&rendered) {
            return Err(self.error(
                id,
                EvalErrorKind::PathInterpolationParentDir,
                "parent-directory sequence introduced by an interpolation",
            ));
        }
        Ok(rendered.into_iter().map(|(c, _)| c).collect())
    }

    pub(crate) fn eval_path_template(&mut self, id: NodeId, segments: &[StrSegment]) -> EvalResult {
        self.eval_path_like(id, segments, false).map(Value::path)
    }

    pub(crate) fn eval_path_pattern_template(
        &mut self,
        id: NodeId,
        segments: &[StrSegment],
    ) -> EvalResult {
        self.eval_path_like(id, segments, true)
            .map(Value::path_pattern)
    }

    pub(crate) fn eval_url_template(
        &mut self,
        id: NodeId,
        base: &str,
        path: &[StrSegment],
        query: &[QueryParam],
    ) -> EvalResult {
        let rendered_path = self.render_segments(id, path)?;
        for (c, interpolated) in &rendered_path {
            if *interpolated && matches!(*c, '?' | '#' | '*' | '\\') {
                return Err(self.error(
                    id,
                    EvalErrorKind::UrlPathInterpolationForbiddenChar(*c),
                    format!("`{c}` is not allowed in a URL path interpolation"),
                ));
            }
        }
        if has_interpolated_parent_dir(&rendered_path) {
            return Err(self.error(
                id,
                EvalErrorKind::UrlPathInterpolationBacktracking,
                "backtracking sequence introduced by a URL path interpolation",
            ));
        }

        let mut url: String = base.to_owned();
        url.extend(rendered_path.iter().map(|(c, _)| c));

        let mut first = true;
        for param in query {
            let rendered_value = self.render_segments(id, &param.value)?;
            for (c, interpolated) in &rendered_value {
                if *interpolated && matches!(*c, '&' | '#') {
                    return Err(self.error(
                        id,
                        EvalErrorKind::UrlQueryInterpolationForbiddenChar(*c),
                        format!("`{c}` is not allowed in a URL query interpolation"),
                    ));
                }
            }
            url.push(if first { '?' } else { '&' });
            first = false;
            url.push_str(&param.name);
            url.push('=');
            url.extend(rendered_value.iter().map(|(c, _)| c));
        }
        Ok(Value::url(url))
    }

    pub(crate) fn eval_str_template(
        &mut self,
        id: NodeId,
        pattern: Option<Name>,
        segments: &[StrSegment],
    ) -> EvalResult {
        let rendered = self.render_segments(id, segments)?;
        let text: String = rendered.into_iter().map(|(c, _)| c).collect();
        if let Some(pattern_name) = pattern {
            let name = self.name_of(pattern_name);
            let Some(checked) = self.state.context.resolve_named_pattern(&name) else {
                return Err(self.error(
                    id,
                    EvalErrorKind::CheckedStringMismatch {
                        pattern: name.clone(),
                    },
                    format!("unknown checked-string pattern `{name}`"),
                ));
            };
            if !checked.matches(&Value::string(text.clone())) {
                return Err(self.error(
                    id,
                    EvalErrorKind::CheckedStringMismatch { pattern: name },
                    "checked string does not match its pattern",
                ));
            }
        }
        Ok(Value::string(text))
    }
}

/// Whether the rendered text contains a `..` sequence (in any encoding)
/// with at least one character originating from an interpolation.
///
/// `%2E`/`%2e` first normalize to `.`; a normalized dot is tagged
/// interpolated when any of its three source characters is. This catches
/// sequences assembled across a literal/interpolation boundary.
fn has_interpolated_parent_dir(rendered: &[TaggedChar]) -> bool {
    let mut normalized: Vec<TaggedChar> = Vec::with_capacity(rendered.len());
    let mut i = 0;
    while i < rendered.len() {
        let is_encoded_dot = rendered[i].0 == '%'
            && i + 2 < rendered.len()
            && rendered[i + 1].0 == '2'
            && matches!(rendered[i + 2].0, 'e' | 'E');
        if is_encoded_dot {
            let tainted = rendered[i].1 || rendered[i + 1].1 || rendered[i + 2].1;
            normalized.push(('.', tainted));
            i += 3;
        } else {
            normalized.push(rendered[i]);
            i += 1;
        }
    }
    normalized
        .windows(2)
        .any(|pair| pair[0].0 == '.' && pair[1].0 == '.' && (pair[0].1 || pair[1].1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Vec<TaggedChar> {
        s.chars().map(|c| (c, false)).collect()
    }

    fn tainted(s: &str) -> Vec<TaggedChar> {
        s.chars().map(|c| (c, true)).collect()
    }

    #[test]
    fn literal_parent_dirs_are_trusted() {
        assert!(!has_interpolated_parent_dir(&lit("/a/../b")));
    }

    #[test]
    fn interpolated_parent_dirs_are_rejected() {
        assert!(has_interpolated_parent_dir(&tainted("..")));
    }

    #[test]
    fn boundary_crossing_sequences_are_rejected() {
        // Literal `.` followed by an interpolated `.`.
        let mut rendered = lit("/a/.");
        rendered.extend(tainted("./b"));
        assert!(has_interpolated_parent_dir(&rendered));
    }

    #[test]
    fn percent_encoded_dots_are_decoded() {
        assert!(has_interpolated_parent_dir(&tainted("%2E%2e")));
        // Encoded dot split across the boundary: `%2` literal + `E.` interpolated.
        let mut rendered = lit("%2");
        rendered.extend(tainted("E."));
        assert!(has_interpolated_parent_dir(&rendered));
    }
}
