use crate::error::{InvalidRecords, LoadError, NotFound, WriteError};
use crate::persist;
use crate::source::{self, read_json};
use review_model::{BoundingBox, Position, QuestionFields, Record, RecordKey};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Every record of one review, ordered by (page, question), plus the set of
/// records edited since the last save.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: BTreeMap<RecordKey, Record>,
    dirty: BTreeSet<RecordKey>,
    /// `extra` as loaded, for records whose fields were edited since.
    loaded_extra: BTreeMap<RecordKey, Map<String, Value>>,
    page_count: u32,
    exam_details: Option<Value>,
}

impl RecordStore {
    /// Merges the bbox and OCR files into records.
    ///
    /// Every bbox entry must point at a page in `1..=page_count`, and every
    /// OCR question needs a bbox entry. Bbox entries with no OCR question are
    /// skipped.
    pub fn load(bbox_path: &Path, ocr_path: &Path, page_count: u32) -> Result<Self, LoadError> {
        let bboxes = source::read_bboxes(bbox_path)?;
        let ocr = source::read_ocr(ocr_path)?;

        for (&question, entry) in &bboxes {
            if entry.page == 0 || entry.page > page_count {
                return Err(LoadError::PageOutOfRange {
                    path: bbox_path.to_path_buf(),
                    question,
                    page: entry.page,
                    page_count,
                });
            }
        }

        let mut records = BTreeMap::new();
        for (question, ocr_question) in ocr.questions {
            let entry = bboxes.get(&question).ok_or_else(|| LoadError::MissingBoundingBox {
                bbox_path: bbox_path.to_path_buf(),
                question,
            })?;

            let [x0, y0, x1, y1] = entry.bbox;
            let bbox = BoundingBox::from_corners(x0, y0, x1, y1).map_err(|source| {
                LoadError::InvalidBoundingBox { path: bbox_path.to_path_buf(), question, source }
            })?;

            let record = Record::new(entry.page, question, bbox, ocr_question.question_text)
                .with_extra(ocr_question.extra);
            records.insert(record.key(), record);
        }

        let matched: BTreeSet<u32> = records.keys().map(|key| key.question).collect();
        for question in bboxes.keys().filter(|question| !matched.contains(question)) {
            tracing::warn!(question, "bbox entry has no OCR question, skipping");
        }

        tracing::info!(
            records = records.len(),
            pages = page_count,
            bbox = %bbox_path.display(),
            ocr = %ocr_path.display(),
            "loaded review records"
        );

        Ok(Self {
            records,
            dirty: BTreeSet::new(),
            loaded_extra: BTreeMap::new(),
            page_count,
            exam_details: ocr.exam_details,
        })
    }

    /// Rebuilds a store from a file written by [`RecordStore::save`].
    pub fn from_saved(path: &Path, page_count: u32) -> Result<Self, LoadError> {
        let saved: Vec<Record> = read_json(path)?;

        let mut records = BTreeMap::new();
        for record in saved {
            if record.page == 0 || record.page > page_count {
                return Err(LoadError::PageOutOfRange {
                    path: path.to_path_buf(),
                    question: record.question_id,
                    page: record.page,
                    page_count,
                });
            }

            let key = record.key();
            if records.insert(key, record).is_some() {
                return Err(LoadError::DuplicateRecord { path: path.to_path_buf(), key });
            }
        }

        Ok(Self { records, page_count, ..Self::default() })
    }

    /// Copies corrected text and edited fields from a previously saved file
    /// onto matching records. Returns how many records picked up a change.
    ///
    /// Applied changes count as unsaved edits only when they differ from
    /// what the store already holds.
    pub fn apply_saved(&mut self, path: &Path) -> Result<usize, LoadError> {
        let saved: Vec<Record> = read_json(path)?;

        let mut applied = 0;
        for saved_record in saved {
            let key = saved_record.key();
            let Some(record) = self.records.get_mut(&key) else {
                tracing::warn!(%key, path = %path.display(), "saved correction has no matching record");
                continue;
            };

            let before = record.extra.clone();
            let text_changed = saved_record.is_corrected() && record.set_correction(saved_record.corrected_text());
            let fields_changed = record.set_fields(saved_record.fields());
            if fields_changed {
                self.loaded_extra.entry(key).or_insert(before);
            }
            if text_changed || fields_changed {
                self.dirty.insert(key);
                applied += 1;
            }
        }

        tracing::info!(applied, path = %path.display(), "resumed saved corrections");
        Ok(applied)
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn exam_details(&self) -> Option<&Value> {
        self.exam_details.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn get(&self, page: u32, question: u32) -> Result<&Record, NotFound> {
        let key = RecordKey::new(page, question);
        self.records.get(&key).ok_or(NotFound { key })
    }

    /// Records on `page` (1-based), in question order.
    pub fn list_for_page(&self, page: u32) -> Vec<&Record> {
        self.records
            .range(RecordKey::new(page, 0)..=RecordKey::new(page, u32::MAX))
            .map(|(_, record)| record)
            .collect()
    }

    /// Pages that hold at least one record, ascending.
    pub fn pages(&self) -> Vec<u32> {
        let pages: BTreeSet<u32> = self.records.keys().map(|key| key.page).collect();
        pages.into_iter().collect()
    }

    pub fn page_groups(&self) -> BTreeMap<u32, Vec<&Record>> {
        let mut groups: BTreeMap<u32, Vec<&Record>> = BTreeMap::new();
        for record in self.records.values() {
            groups.entry(record.page).or_default().push(record);
        }
        groups
    }

    /// Question count for each page index `0..page_count`, the layout a
    /// [`review_model::Navigator`] walks.
    pub fn question_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.page_count as usize];
        for key in self.records.keys() {
            if let Some(count) = counts.get_mut(key.page as usize - 1) {
                *count += 1;
            }
        }
        counts
    }

    /// The record shown at a navigator position.
    pub fn record_at(&self, position: Position) -> Option<&Record> {
        let page = u32::try_from(position.page_index).ok()?.checked_add(1)?;
        self.list_for_page(page).into_iter().nth(position.question_index)
    }

    /// Navigator position of `key`, if the record exists.
    pub fn position_of(&self, key: RecordKey) -> Option<Position> {
        let question_index =
            self.list_for_page(key.page).iter().position(|record| record.key() == key)?;
        Some(Position::new(key.page as usize - 1, question_index))
    }

    /// Records `new_text` as the correction. Nothing is written to disk.
    /// Returns whether the text changed.
    pub fn update(&mut self, page: u32, question: u32, new_text: &str) -> Result<bool, NotFound> {
        let key = RecordKey::new(page, question);
        let record = self.records.get_mut(&key).ok_or(NotFound { key })?;

        let changed = record.set_correction(new_text);
        if changed {
            tracing::debug!(%key, "record corrected");
            self.dirty.insert(key);
        }
        Ok(changed)
    }

    /// Stores edited structured fields. Nothing is written to disk.
    /// Returns whether the record changed.
    pub fn update_fields(&mut self, page: u32, question: u32, fields: QuestionFields) -> Result<bool, NotFound> {
        let key = RecordKey::new(page, question);
        let record = self.records.get_mut(&key).ok_or(NotFound { key })?;

        let before = record.extra.clone();
        let changed = record.set_fields(fields);
        if changed {
            tracing::debug!(%key, "record fields edited");
            self.loaded_extra.entry(key).or_insert(before);
            self.dirty.insert(key);
        }
        Ok(changed)
    }

    /// Drops the correction and any field edits so the record shows what
    /// was loaded again.
    pub fn revert(&mut self, page: u32, question: u32) -> Result<bool, NotFound> {
        let key = RecordKey::new(page, question);
        let record = self.records.get_mut(&key).ok_or(NotFound { key })?;

        let mut changed = record.clear_correction();
        if let Some(extra) = self.loaded_extra.remove(&key) {
            changed |= record.extra != extra;
            record.extra = extra;
        }
        if changed {
            self.dirty.insert(key);
        }
        Ok(changed)
    }

    pub fn corrected_count(&self) -> usize {
        self.records.values().filter(|record| record.is_corrected()).count()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn is_record_dirty(&self, key: RecordKey) -> bool {
        self.dirty.contains(&key)
    }

    pub fn dirty_keys(&self) -> impl Iterator<Item = RecordKey> + '_ {
        self.dirty.iter().copied()
    }

    pub fn has_field_edits(&self, key: RecordKey) -> bool {
        self.loaded_extra
            .get(&key)
            .zip(self.records.get(&key))
            .is_some_and(|(loaded, record)| *loaded != record.extra)
    }

    /// Validates every record edited since the last save.
    pub fn validate_dirty(&self) -> Result<(), InvalidRecords> {
        let invalid: Vec<_> = self
            .dirty
            .iter()
            .filter_map(|key| self.records.get(key))
            .map(|record| (record.key(), record.validate()))
            .filter(|(_, errors)| !errors.is_empty())
            .collect();

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(InvalidRecords { records: invalid })
        }
    }

    pub fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    /// Writes every record to `path` atomically, then clears the dirty set.
    /// On failure the dirty set is kept and any existing file is unchanged.
    pub fn save(&mut self, path: &Path) -> Result<(), WriteError> {
        persist::save(self.records.values(), path)?;
        tracing::info!(
            records = self.records.len(),
            edited = self.dirty.len(),
            path = %path.display(),
            "saved corrections"
        );
        self.mark_clean();
        Ok(())
    }
}
