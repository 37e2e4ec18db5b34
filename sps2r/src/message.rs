// sps2r - a compiler from SPSS statistical syntax to tidyverse R.
// Copyright (C) 2026 The sps2r authors.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

//! Source locations for diagnostics.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    iter::once,
    ops::Range,
    sync::Arc,
};

use unicode_width::UnicodeWidthStr;

/// A line number and optional column number within a source file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Point {
    /// 1-based line number.
    pub line: i32,

    /// 1-based column number, measured in the width of characters as shown in
    /// a typical fixed-width font, as measured by the `unicode_width` crate.
    pub column: Option<i32>,
}

/// Location relevant to a diagnostic message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Location {
    /// File name, if any.
    pub file_name: Option<Arc<String>>,

    /// Starting and ending point, if any.
    pub span: Option<Range<Point>>,
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if let Some(file_name) = &self.file_name {
            write!(f, "{}", file_name)?;
        }

        if let Some(span) = &self.span {
            if self.file_name.is_some() {
                write!(f, ":")?;
            }
            let l1 = span.start.line;
            let l2 = span.end.line;
            match (span.start.column.zip(span.end.column), l2 > l1) {
                (Some((c1, c2)), true) => write!(f, "{l1}.{c1}-{l2}.{}", c2 - 1)?,
                (Some((c1, c2)), false) => write!(f, "{l1}.{c1}-{}", c2 - 1)?,
                (None, true) => write!(f, "{l1}-{l2}")?,
                (None, false) => write!(f, "{l1}")?,
            }
        }
        Ok(())
    }
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.file_name.is_none() && self.span.is_none()
    }
}

/// A source file held in memory, with an index of line starts so that byte
/// offsets can be mapped back to line and column numbers.
pub struct SourceFile {
    /// `None` if the source did not come from a file.
    file_name: Option<Arc<String>>,

    /// Source file contents.
    contents: String,

    /// Byte offsets into `contents` of starts of lines.  The first element is
    /// 0.
    lines: Vec<usize>,
}

impl SourceFile {
    pub fn new(contents: String, file_name: Option<String>) -> Self {
        let lines = once(0)
            .chain(contents.match_indices('\n').map(|(index, _s)| index + 1))
            .filter(|index| *index < contents.len())
            .collect::<Vec<_>>();
        Self {
            file_name: file_name.map(Arc::new),
            contents,
            lines,
        }
    }

    pub fn for_string(contents: String) -> Self {
        Self::new(contents, None)
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    fn offset_to_point(&self, offset: usize) -> Point {
        let line = self
            .lines
            .partition_point(|&line_start| line_start <= offset);
        Point {
            line: line as i32,
            column: Some(
                self.contents
                    .get(self.lines[line - 1]..offset)
                    .unwrap_or_default()
                    .width() as i32
                    + 1,
            ),
        }
    }

    /// Returns the [Location] of the bytes in `range`.
    pub fn location(&self, range: Range<usize>) -> Location {
        Location {
            file_name: self.file_name.clone(),
            span: Some(self.offset_to_point(range.start)..self.offset_to_point(range.end)),
        }
    }
}
