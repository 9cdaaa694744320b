//! In-memory symbol indexes and the definition-wins merge.
//!
//! Four maps: class names, function names, files, and USRs. The USR index
//! holds at most one record per USR; replacing a declaration with its
//! definition leaves the declaration visible in its header's file entry so
//! headers remain populated.

use crate::scanner;
use crate::symbol::Symbol;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SymbolIndexes {
    pub class_index: HashMap<String, Vec<Arc<Symbol>>>,
    pub function_index: HashMap<String, Vec<Arc<Symbol>>>,
    pub file_index: HashMap<String, Vec<Arc<Symbol>>>,
    pub usr_index: HashMap<String, Arc<Symbol>>,
}

impl SymbolIndexes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.class_index.clear();
        self.function_index.clear();
        self.file_index.clear();
        self.usr_index.clear();
    }

    pub fn symbol_count(&self) -> usize {
        self.usr_index.len()
    }

    /// Merge one symbol under the definition-wins rule. Returns true when
    /// the record entered the name and USR indexes.
    ///
    /// Losing records (a later declaration, a duplicate definition) still
    /// get a file entry so headers stay populated regardless of the order
    /// in which parallel units complete.
    pub fn merge(&mut self, mut symbol: Symbol) -> bool {
        if !symbol.usr.is_empty()
            && let Some(existing) = self.usr_index.get(&symbol.usr).cloned()
        {
            if symbol.is_definition && !existing.is_definition {
                // The definition replaces the declaration in the name and
                // USR indexes, but the declaration stays in its file entry.
                self.remove_from_name_index(&existing);
                self.usr_index.remove(&symbol.usr);
                if let Some((decl_patch, def_patch)) = mirror_locations(&existing, &symbol) {
                    self.patch_file_entry(&existing.file, &existing.usr, decl_patch);
                    apply_patch(&mut symbol, def_patch);
                }
            } else {
                // Both declarations, both definitions, or existing already
                // the definition: first seen wins.
                if !symbol.is_definition
                    && existing.is_definition
                    && let Some((decl_patch, def_patch)) = mirror_locations(&symbol, &existing)
                {
                    apply_patch(&mut symbol, decl_patch);
                    self.patch_everywhere(&existing, def_patch);
                }
                self.insert_file_entry(Arc::new(symbol));
                return false;
            }
        }

        let arc = Arc::new(symbol);
        self.name_index_for(arc.kind.is_class_like())
            .entry(arc.name.clone())
            .or_default()
            .push(arc.clone());
        if !arc.usr.is_empty() {
            self.usr_index.insert(arc.usr.clone(), arc.clone());
        }
        self.insert_file_entry(arc);
        true
    }

    fn insert_file_entry(&mut self, arc: Arc<Symbol>) {
        if arc.file.is_empty() {
            return;
        }
        let entries = self.file_index.entry(arc.file.clone()).or_default();
        // No exact duplicates by (usr, file).
        let duplicate = !arc.usr.is_empty() && entries.iter().any(|s| s.usr == arc.usr);
        if !duplicate {
            entries.push(arc);
        }
    }

    /// Replace the file entry for `(file, usr)` with a patched copy.
    fn patch_file_entry(&mut self, file: &str, usr: &str, patch: LocationPatch) {
        if let Some(entries) = self.file_index.get_mut(file)
            && let Some(slot) = entries.iter_mut().find(|s| s.usr == usr)
        {
            let mut updated = (**slot).clone();
            apply_patch(&mut updated, patch);
            *slot = Arc::new(updated);
        }
    }

    /// Patch a record in every index that holds it.
    fn patch_everywhere(&mut self, record: &Arc<Symbol>, patch: LocationPatch) {
        let mut updated = (**record).clone();
        apply_patch(&mut updated, patch);
        let updated = Arc::new(updated);
        self.usr_index.insert(record.usr.clone(), updated.clone());
        let index = self.name_index_for(record.kind.is_class_like());
        if let Some(entries) = index.get_mut(&record.name)
            && let Some(slot) = entries
                .iter_mut()
                .find(|s| s.usr == record.usr && s.file == record.file)
        {
            *slot = updated.clone();
        }
        if let Some(entries) = self.file_index.get_mut(&record.file)
            && let Some(slot) = entries.iter_mut().find(|s| s.usr == record.usr)
        {
            *slot = updated;
        }
    }

    fn name_index_for(&mut self, class_like: bool) -> &mut HashMap<String, Vec<Arc<Symbol>>> {
        if class_like {
            &mut self.class_index
        } else {
            &mut self.function_index
        }
    }

    fn remove_from_name_index(&mut self, symbol: &Arc<Symbol>) {
        let index = self.name_index_for(symbol.kind.is_class_like());
        if let Some(entries) = index.get_mut(&symbol.name) {
            entries.retain(|s| s.usr != symbol.usr || s.file != symbol.file || s.line != symbol.line);
            if entries.is_empty() {
                index.remove(&symbol.name);
            }
        }
    }

    /// Remove a symbol from every index, including file entries.
    pub fn remove_usr(&mut self, usr: &str) {
        let Some(symbol) = self.usr_index.remove(usr) else {
            return;
        };
        self.remove_from_name_index(&symbol);
        self.purge_usr_from_files(usr);
    }

    fn purge_usr_from_files(&mut self, usr: &str) {
        let mut empty_files = Vec::new();
        for (file, entries) in self.file_index.iter_mut() {
            entries.retain(|s| s.usr != usr);
            if entries.is_empty() {
                empty_files.push(file.clone());
            }
        }
        for file in empty_files {
            self.file_index.remove(&file);
        }
    }

    /// Remove everything recorded for a file (used before re-inserting a
    /// modified file's symbols and when a file is deleted). Returns the
    /// USRs that were dropped from the USR index.
    pub fn remove_file(&mut self, file: &str, owned_usrs: &[String]) -> Vec<String> {
        let mut dropped = Vec::new();
        for usr in owned_usrs {
            if let Some(existing) = self.usr_index.get(usr) {
                // Keep the USR if its surviving record lives elsewhere.
                if existing.file != file {
                    continue;
                }
            }
            if self.usr_index.contains_key(usr) {
                self.remove_usr(usr);
                dropped.push(usr.clone());
            }
        }
        self.file_index.remove(file);
        dropped
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<Symbol>> {
        self.class_index.values().flatten()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Arc<Symbol>> {
        self.function_index.values().flatten()
    }
}

/// `header_*` fields to set on a record.
struct LocationPatch {
    file: String,
    line: u32,
    start_line: u32,
    end_line: u32,
}

fn apply_patch(symbol: &mut Symbol, patch: LocationPatch) {
    symbol.header_file = Some(patch.file);
    symbol.header_line = Some(patch.line);
    symbol.header_start_line = Some(patch.start_line);
    symbol.header_end_line = Some(patch.end_line);
}

/// When a declaration in a header has its definition in a non-header file,
/// each record mirrors the other's location. Returns
/// `(patch for the declaration, patch for the definition)`.
fn mirror_locations(
    declaration: &Symbol,
    definition: &Symbol,
) -> Option<(LocationPatch, LocationPatch)> {
    if declaration.file == definition.file {
        return None;
    }
    let decl_is_header = scanner::is_header(Path::new(&declaration.file));
    let def_is_header = scanner::is_header(Path::new(&definition.file));
    // Both in headers (templates, inline definitions): no mirroring.
    if !decl_is_header || def_is_header {
        return None;
    }
    Some((
        LocationPatch {
            file: definition.file.clone(),
            line: definition.line,
            start_line: definition.start_line,
            end_line: definition.end_line,
        },
        LocationPatch {
            file: declaration.file.clone(),
            line: declaration.line,
            start_line: declaration.start_line,
            end_line: declaration.end_line,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolKind;

    fn class(name: &str, usr: &str, file: &str, def: bool, lines: (u32, u32)) -> Symbol {
        let mut s = Symbol::new(name, SymbolKind::Class, usr, file, lines.0, 1);
        s.is_definition = def;
        s.start_line = lines.0;
        s.end_line = lines.1;
        s
    }

    #[test]
    fn definition_wins_over_declaration() {
        let mut idx = SymbolIndexes::new();
        idx.merge(class("Q", "c:@S@Q", "/p/a.h", false, (1, 1)));
        idx.merge(class("Q", "c:@S@Q", "/p/b.h", true, (1, 3)));

        let survivor = &idx.usr_index["c:@S@Q"];
        assert!(survivor.is_definition);
        assert_eq!(survivor.file, "/p/b.h");
        assert_eq!((survivor.start_line, survivor.end_line), (1, 3));

        // One record in the class index.
        assert_eq!(idx.class_index["Q"].len(), 1);
        // The declaration stays visible in its header's file entry.
        assert_eq!(idx.file_index["/p/a.h"].len(), 1);
        assert!(!idx.file_index["/p/a.h"][0].is_definition);
    }

    #[test]
    fn declaration_after_definition_keeps_definition() {
        let mut idx = SymbolIndexes::new();
        idx.merge(class("Q", "c:@S@Q", "/p/b.h", true, (1, 3)));
        assert!(!idx.merge(class("Q", "c:@S@Q", "/p/a.h", false, (1, 1))));
        assert!(idx.usr_index["c:@S@Q"].is_definition);
        assert_eq!(idx.class_index["Q"].len(), 1);
        // The late declaration still gets its file entry, so the final
        // state is independent of unit completion order.
        assert_eq!(idx.file_index["/p/a.h"].len(), 1);
        assert!(!idx.file_index["/p/a.h"][0].is_definition);
    }

    #[test]
    fn first_declaration_wins_among_declarations() {
        let mut idx = SymbolIndexes::new();
        idx.merge(class("Q", "c:@S@Q", "/p/a.h", false, (1, 1)));
        assert!(!idx.merge(class("Q", "c:@S@Q", "/p/c.h", false, (5, 5))));
        assert_eq!(idx.usr_index["c:@S@Q"].file, "/p/a.h");
    }

    #[test]
    fn no_exact_duplicates_in_file_index() {
        let mut idx = SymbolIndexes::new();
        idx.merge(class("A", "c:@S@A", "/p/x.h", false, (1, 1)));
        // Same USR arriving again for the same file (re-extraction) does
        // not duplicate the file entry.
        idx.merge(class("A", "c:@S@A", "/p/x.h", false, (1, 1)));
        assert_eq!(idx.file_index["/p/x.h"].len(), 1);
    }

    #[test]
    fn method_definition_mirrors_header_location() {
        let mut idx = SymbolIndexes::new();
        let mut decl = Symbol::new("draw", SymbolKind::Method, "c:@F@W::draw#", "/p/w.h", 4, 10);
        decl.is_definition = false;
        idx.merge(decl);

        let mut def = Symbol::new("draw", SymbolKind::Method, "c:@F@W::draw#", "/p/w.cpp", 12, 6);
        def.is_definition = true;
        def.start_line = 12;
        def.end_line = 20;
        idx.merge(def);

        let survivor = &idx.usr_index["c:@F@W::draw#"];
        assert_eq!(survivor.file, "/p/w.cpp");
        assert_eq!(survivor.header_file.as_deref(), Some("/p/w.h"));
        assert_eq!(survivor.header_line, Some(4));
    }

    #[test]
    fn remove_file_spares_shared_usrs() {
        let mut idx = SymbolIndexes::new();
        idx.merge(class("Q", "c:@S@Q", "/p/a.h", false, (1, 1)));
        idx.merge(class("Q", "c:@S@Q", "/p/b.h", true, (1, 3)));
        idx.merge(class("R", "c:@S@R", "/p/a.h", true, (5, 8)));

        // Deleting a.h removes R entirely but leaves the Q definition,
        // whose surviving record belongs to b.h.
        let dropped = idx.remove_file("/p/a.h", &["c:@S@Q".into(), "c:@S@R".into()]);
        assert_eq!(dropped, vec!["c:@S@R".to_string()]);
        assert!(idx.usr_index.contains_key("c:@S@Q"));
        assert!(!idx.usr_index.contains_key("c:@S@R"));
        assert!(!idx.file_index.contains_key("/p/a.h"));
    }
}
