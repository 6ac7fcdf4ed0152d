//! Grouping of bulleted lists, recomputed from recorded bullet columns.
//!
//! [`outline`] reads the grouping the parser produced off the AST.
//! [`regroup`] derives the same grouping from nothing but the positions of
//! the bullets: a bullet at the column of an open list adds an item to it, a
//! bullet further right opens a list inside the current item, and a bullet
//! at or left of an open list's column closes that list.

use crate::ast::{BulletList, Expr, ExprKind, Junction};

/// A bullet as it appears in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulletMark {
    pub line: u32,
    pub column: u32,
    pub kind: Junction,
}

/// One bulleted list and the lists nested in its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outline {
    pub kind: Junction,
    pub column: u32,
    pub items: Vec<OutlineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineItem {
    pub line: u32,
    pub column: u32,
    /// Lists nested in this item, in source order.
    pub children: Vec<Outline>,
}

impl Outline {
    /// Every bullet of this list and its nested lists, in source order.
    pub fn marks(&self) -> Vec<BulletMark> {
        let mut marks = Vec::new();
        self.collect_marks(&mut marks);
        marks.sort_by_key(|m| (m.line, m.column));
        marks
    }

    fn collect_marks(&self, marks: &mut Vec<BulletMark>) {
        for item in &self.items {
            marks.push(BulletMark {
                line: item.line,
                column: item.column,
                kind: self.kind,
            });
            for child in &item.children {
                child.collect_marks(marks);
            }
        }
    }

    /// The nesting structure alone, without positions: `/\[.\/[.,.],.]`.
    pub fn shape(&self) -> String {
        let items: Vec<String> = self
            .items
            .iter()
            .map(|item| {
                let children: String = item.children.iter().map(Outline::shape).collect();
                format!(".{children}")
            })
            .collect();
        format!("{}[{}]", self.kind.bullet(), items.join(","))
    }
}

/// The grouping of a parsed list.
pub fn outline(list: &BulletList) -> Outline {
    Outline {
        kind: list.kind,
        column: list.column,
        items: list
            .items
            .iter()
            .map(|item| {
                let mut nested = Vec::new();
                nested_lists(&item.expr, &mut nested);
                nested.sort_by_key(|l| l.items.first().map(|i| (i.line, i.column)));
                OutlineItem {
                    line: item.line,
                    column: item.column,
                    children: nested.into_iter().map(outline).collect(),
                }
            })
            .collect(),
    }
}

/// The outermost lists inside `expr`.
fn nested_lists<'a>(expr: &'a Expr, out: &mut Vec<&'a BulletList>) {
    match &expr.kind {
        ExprKind::BulletList(list) => out.push(list),
        _ => expr.for_each_child(|child| nested_lists(child, out)),
    }
}

/// Group bullets, given in source order, into lists by column alone.
pub fn regroup(marks: &[BulletMark]) -> Vec<Outline> {
    let mut roots = Vec::new();
    let mut open: Vec<Outline> = Vec::new();

    for mark in marks {
        while let Some(top) = open.last() {
            if mark.column > top.column || (mark.column == top.column && mark.kind == top.kind) {
                break;
            }
            close_innermost(&mut open, &mut roots);
        }
        let item = OutlineItem {
            line: mark.line,
            column: mark.column,
            children: Vec::new(),
        };
        match open.last_mut() {
            Some(top) if top.column == mark.column => top.items.push(item),
            _ => open.push(Outline {
                kind: mark.kind,
                column: mark.column,
                items: vec![item],
            }),
        }
    }
    while !open.is_empty() {
        close_innermost(&mut open, &mut roots);
    }
    roots
}

fn close_innermost(open: &mut Vec<Outline>, roots: &mut Vec<Outline>) {
    let Some(done) = open.pop() else {
        return;
    };
    match open.last_mut().and_then(|parent| parent.items.last_mut()) {
        Some(item) => item.children.push(done),
        None => roots.push(done),
    }
}
