//! Editor-analysis indexing: a per-token map from source positions to the
//! semantic facts discovered during analysis.
//!
//! After analysis, every compilation unit's AST is walked once. Nodes the
//! walker recognises get a fresh analysis-item index, a reference on every
//! source line they cover, and one [`EditorInfo`] record per analysis pass
//! that touched them. Parser and semantic errors are materialised as
//! additional items so the IDE layer has one uniform query surface.

use rustc_hash::FxHashMap;
use upp_util::UnitId;

use upp_par::ast::NodeKind;

use crate::passes::{AnalysisInfo, PassId};
use crate::symbols::SymbolId;
use crate::{Compiler, NodeRef};

/// Markup classification for nodes without richer semantic payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkupColor {
    Module,
    Definition,
    CodeBlock,
    Parameter,
    ContextChange,
}

#[derive(Clone, Debug)]
pub enum EditorInfoKind {
    Markup { color: MarkupColor },
    Expression { node: NodeRef },
    SymbolLookup { symbol: Option<SymbolId> },
    CallInformation { node: NodeRef },
    Argument { call: NodeRef, argument_index: u32 },
    ErrorItem { error_index: u32 },
}

/// One semantic fact, tagged with the pass that discovered it.
#[derive(Clone, Debug)]
pub struct EditorInfo {
    pub item_index: u32,
    pub pass: PassId,
    pub kind: EditorInfoKind,
}

/// Line-level reference into the sorted info array.
#[derive(Clone, Copy, Debug)]
pub struct EditorInfoReference {
    pub item_index: u32,
    pub char_start: u32,
    pub char_end: u32,
    pub tree_depth: u32,
    /// Slice of the sorted infos array
    pub info_start: u32,
    pub info_count: u32,
}

/// The full editor index: per-line references plus one flat sorted info
/// array.
#[derive(Default)]
pub struct EditorIndex {
    /// `lines[unit][line]` holds the references covering that line
    pub lines: FxHashMap<UnitId, Vec<Vec<EditorInfoReference>>>,
    pub infos: Vec<EditorInfo>,
}

impl EditorIndex {
    /// References on one line, if any.
    pub fn references_at(&self, unit: UnitId, line: u32) -> &[EditorInfoReference] {
        self.lines
            .get(&unit)
            .and_then(|lines| lines.get(line as usize))
            .map(|refs| refs.as_slice())
            .unwrap_or(&[])
    }

    /// Infos of one reference.
    pub fn infos_of(&self, reference: &EditorInfoReference) -> &[EditorInfo] {
        let start = reference.info_start as usize;
        let end = start + reference.info_count as usize;
        self.infos.get(start..end).unwrap_or(&[])
    }
}

/// Build the editor index from the collected analysis passes and error
/// lists.
pub fn build_editor_index(comp: &Compiler) -> EditorIndex {
    let mut infos: Vec<EditorInfo> = Vec::new();
    let mut references: FxHashMap<UnitId, Vec<Vec<(u32, EditorInfoReference)>>> =
        FxHashMap::default();
    let mut next_item_index = 0u32;

    for unit in units_of(comp) {
        let line_count = comp.units[unit].buffer.line_count() as usize;
        let unit_lines = references
            .entry(unit)
            .or_insert_with(|| vec![Vec::new(); line_count]);

        for (node_id, node) in comp.units[unit].ast.iter() {
            let node_ref = NodeRef::new(unit, node_id);
            let passes = comp.analysis.passes_of(node_ref);
            let markup = markup_for(&node.kind);
            if passes.is_empty() && markup.is_none() {
                continue;
            }

            let item_index = next_item_index;
            next_item_index += 1;

            // One info per pass that analysed this node
            for &pass in passes {
                match comp.analysis.info(node_ref, pass) {
                    Some(AnalysisInfo::Expression(_)) => {
                        infos.push(EditorInfo {
                            item_index,
                            pass,
                            kind: EditorInfoKind::Expression { node: node_ref },
                        });
                    }
                    Some(AnalysisInfo::SymbolLookup { symbol }) => {
                        infos.push(EditorInfo {
                            item_index,
                            pass,
                            kind: EditorInfoKind::SymbolLookup { symbol: *symbol },
                        });
                    }
                    Some(AnalysisInfo::ParameterMatching(matching)) => {
                        infos.push(EditorInfo {
                            item_index,
                            pass,
                            kind: EditorInfoKind::CallInformation { node: node_ref },
                        });
                        for (argument_index, matched) in matching.matched.iter().enumerate() {
                            if matched.argument.is_some() {
                                infos.push(EditorInfo {
                                    item_index,
                                    pass,
                                    kind: EditorInfoKind::Argument {
                                        call: node_ref,
                                        argument_index: argument_index as u32,
                                    },
                                });
                            }
                        }
                    }
                    Some(AnalysisInfo::DefinitionSymbol { symbol })
                    | Some(AnalysisInfo::Parameter { symbol }) => {
                        infos.push(EditorInfo {
                            item_index,
                            pass,
                            kind: EditorInfoKind::SymbolLookup {
                                symbol: Some(*symbol),
                            },
                        });
                    }
                    _ => {
                        if let Some(color) = markup {
                            infos.push(EditorInfo {
                                item_index,
                                pass,
                                kind: EditorInfoKind::Markup { color },
                            });
                        }
                    }
                }
            }
            if passes.is_empty() {
                if let Some(color) = markup {
                    infos.push(EditorInfo {
                        item_index,
                        pass: PassId(0),
                        kind: EditorInfoKind::Markup { color },
                    });
                }
            }

            // A reference on every line the node covers
            let text_range = comp.units[unit]
                .buffer
                .token_range_to_text_range(node.range);
            let depth = comp.units[unit].ast.depth(node_id);
            for line in text_range.start.line..=text_range.end.line {
                let Some(line_slot) = unit_lines.get_mut(line as usize) else {
                    continue;
                };
                let line_text_length =
                    comp.units[unit].buffer.lines[line as usize].text.chars().count() as u32;
                let char_start = if line == text_range.start.line {
                    text_range.start.character
                } else {
                    0
                };
                let char_end = if line == text_range.end.line {
                    text_range.end.character
                } else {
                    line_text_length
                };
                line_slot.push((
                    item_index,
                    EditorInfoReference {
                        item_index,
                        char_start,
                        char_end,
                        tree_depth: depth,
                        info_start: 0,
                        info_count: 0,
                    },
                ));
            }
        }
    }

    // Errors become uniform items anchored at their position
    for (error_index, error) in comp.semantic_errors.iter().enumerate() {
        let item_index = next_item_index;
        next_item_index += 1;
        infos.push(EditorInfo {
            item_index,
            pass: PassId(0),
            kind: EditorInfoKind::ErrorItem {
                error_index: error_index as u32,
            },
        });
        push_point_reference(
            &mut references,
            comp,
            error.unit,
            error.text_index.line,
            error.text_index.character,
            item_index,
        );
    }
    let semantic_error_count = comp.semantic_errors.len();
    for (diag_index, diagnostic) in comp.handler.diagnostics().iter().enumerate() {
        if diagnostic.level != upp_util::Level::Error {
            continue;
        }
        let item_index = next_item_index;
        next_item_index += 1;
        infos.push(EditorInfo {
            item_index,
            pass: PassId(0),
            kind: EditorInfoKind::ErrorItem {
                error_index: (semantic_error_count + diag_index) as u32,
            },
        });
        push_point_reference(
            &mut references,
            comp,
            diagnostic.unit,
            diagnostic.range.start.line,
            diagnostic.range.start.character,
            item_index,
        );
    }

    // Sort by (item, pass), then hand each reference its slice
    infos.sort_by_key(|info| (info.item_index, info.pass));
    let mut slice_of_item: FxHashMap<u32, (u32, u32)> = FxHashMap::default();
    for (position, info) in infos.iter().enumerate() {
        let entry = slice_of_item
            .entry(info.item_index)
            .or_insert((position as u32, 0));
        entry.1 += 1;
    }

    let mut lines: FxHashMap<UnitId, Vec<Vec<EditorInfoReference>>> = FxHashMap::default();
    for (unit, unit_lines) in references {
        let resolved: Vec<Vec<EditorInfoReference>> = unit_lines
            .into_iter()
            .map(|line_refs| {
                line_refs
                    .into_iter()
                    .filter_map(|(item_index, mut reference)| {
                        // References with zero infos are dropped
                        let &(start, count) = slice_of_item.get(&item_index)?;
                        if count == 0 {
                            return None;
                        }
                        reference.info_start = start;
                        reference.info_count = count;
                        Some(reference)
                    })
                    .collect()
            })
            .collect();
        lines.insert(unit, resolved);
    }

    EditorIndex { lines, infos }
}

fn units_of(comp: &Compiler) -> Vec<UnitId> {
    comp.units.indices().collect()
}

fn markup_for(kind: &NodeKind) -> Option<MarkupColor> {
    match kind {
        NodeKind::Module { .. } => Some(MarkupColor::Module),
        NodeKind::Definition { .. } => Some(MarkupColor::Definition),
        NodeKind::CodeBlock { .. } => Some(MarkupColor::CodeBlock),
        NodeKind::Parameter { .. } => Some(MarkupColor::Parameter),
        NodeKind::ContextChange { .. } => Some(MarkupColor::ContextChange),
        _ => None,
    }
}

fn push_point_reference(
    references: &mut FxHashMap<UnitId, Vec<Vec<(u32, EditorInfoReference)>>>,
    comp: &Compiler,
    unit: UnitId,
    line: u32,
    character: u32,
    item_index: u32,
) {
    let line_count = comp
        .units
        .get(unit)
        .map(|u| u.buffer.line_count() as usize)
        .unwrap_or(0);
    let unit_lines = references
        .entry(unit)
        .or_insert_with(|| vec![Vec::new(); line_count]);
    if let Some(line_slot) = unit_lines.get_mut(line as usize) {
        line_slot.push((
            item_index,
            EditorInfoReference {
                item_index,
                char_start: character,
                char_end: character + 1,
                tree_depth: 0,
                info_start: 0,
                info_count: 0,
            },
        ));
    }
}
