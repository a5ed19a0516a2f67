//! Rendering of archetype diagnostics, with or without source snippets.

use std::fmt::Write;

use annotate_snippets::{AnnotationKind, Group, Level, Renderer, Snippet};
use rowan::TextRange;

use super::Diagnostics;
use super::message::{DiagnosticMessage, Severity};

pub struct DiagnosticsPrinter<'d, 's> {
    diagnostics: &'d Diagnostics,
    source: Option<&'s str>,
    path: Option<&'s str>,
    colored: bool,
    cascades: bool,
}

impl<'d, 's> DiagnosticsPrinter<'d, 's> {
    pub fn new(diagnostics: &'d Diagnostics) -> Self {
        Self {
            diagnostics,
            source: None,
            path: None,
            colored: false,
            cascades: true,
        }
    }

    pub fn source(mut self, source: &'s str) -> Self {
        self.source = Some(source);
        self
    }

    pub fn path(mut self, path: &'s str) -> Self {
        self.path = Some(path);
        self
    }

    pub fn colored(mut self, value: bool) -> Self {
        self.colored = value;
        self
    }

    /// Whether to print diagnostics that a higher-priority diagnostic on an
    /// enclosing node already explains.
    pub fn cascades(mut self, value: bool) -> Self {
        self.cascades = value;
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.format(&mut out).expect("String write never fails");
        out
    }

    pub fn format(&self, w: &mut impl Write) -> std::fmt::Result {
        let shown = self.shown();
        match self.source {
            Some(source) => self.format_snippets(w, source, &shown),
            None => format_plain(w, &shown),
        }
    }

    /// Diagnostics to print, in source order.
    fn shown(&self) -> Vec<&'d DiagnosticMessage> {
        let all: Vec<_> = self.diagnostics.iter().collect();
        let mut shown: Vec<_> = all
            .iter()
            .copied()
            .filter(|d| self.cascades || !is_cascade(d, &all))
            .collect();
        shown.sort_by_key(|d| (d.range.start(), d.kind));
        shown
    }

    fn format_snippets(
        &self,
        w: &mut impl Write,
        source: &str,
        shown: &[&DiagnosticMessage],
    ) -> std::fmt::Result {
        let renderer = if self.colored {
            Renderer::styled()
        } else {
            Renderer::plain()
        };

        for (i, diag) in shown.iter().enumerate() {
            // the title carries the message; the caret only marks the node
            let mut snippet = Snippet::source(source)
                .line_start(1)
                .annotation(AnnotationKind::Primary.span(clamp(diag.range, source.len())));
            if let Some(path) = self.path {
                snippet = snippet.path(path);
            }
            for related in &diag.related {
                snippet = snippet.annotation(
                    AnnotationKind::Context
                        .span(clamp(related.range, source.len()))
                        .label(&related.message),
                );
            }

            let level = match diag.severity() {
                Severity::Error => Level::ERROR,
                Severity::Warning => Level::WARNING,
            };
            let mut report: Vec<Group> = vec![level.primary_title(&diag.message).element(snippet)];
            for hint in diag.effective_hints() {
                report.push(Group::with_title(Level::HELP.secondary_title(hint)));
            }

            if i > 0 {
                w.write_char('\n')?;
            }
            write!(w, "{}", renderer.render(&report))?;
        }
        Ok(())
    }
}

fn format_plain(w: &mut impl Write, shown: &[&DiagnosticMessage]) -> std::fmt::Result {
    for (i, diag) in shown.iter().enumerate() {
        if i > 0 {
            w.write_char('\n')?;
        }
        write!(w, "{diag}")?;
    }
    Ok(())
}

/// A diagnostic inside the node of another one that outranks it. A failed
/// outer node makes complaints about its children noise.
fn is_cascade(diag: &DiagnosticMessage, all: &[&DiagnosticMessage]) -> bool {
    all.iter().any(|other| {
        !std::ptr::eq(*other, diag)
            && other.range.contains_range(diag.range)
            && other.range != diag.range
            && other.kind.suppresses(&diag.kind)
    })
}

/// Keep spans inside the source; an empty span marks one character.
fn clamp(range: TextRange, limit: usize) -> std::ops::Range<usize> {
    let start = usize::from(range.start()).min(limit);
    let end = usize::from(range.end()).min(limit);
    if start == end {
        return start..(start + 1).min(limit);
    }
    start..end
}

impl Diagnostics {
    pub fn printer(&self) -> DiagnosticsPrinter<'_, '_> {
        DiagnosticsPrinter::new(self)
    }
}
