use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::scheduler::{Difficulty, ReviewState};

pub const DEFAULT_CATEGORY: &str = "Umum";
pub const HSK_LEVELS: std::ops::RangeInclusive<u8> = 1..=6;

const CSV_HEADER: [&str; 12] = [
    "id",
    "hanzi",
    "pinyin",
    "meaning",
    "hsk_level",
    "category",
    "mastered",
    "difficulty",
    "ease_factor",
    "review_count",
    "last_reviewed",
    "next_review",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub id: String,
    pub hanzi: String,
    pub pinyin: String,
    pub meaning: String,
    pub hsk_level: u8,
    pub category: String,
    #[serde(default)]
    pub mastered: bool,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub ease_factor: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub last_reviewed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_review: Option<DateTime<Utc>>,
}

impl Vocabulary {
    pub fn new(hanzi: &str, pinyin: &str, meaning: &str, hsk_level: u8, category: &str) -> Self {
        Vocabulary {
            id: uuid::Uuid::new_v4().to_string(),
            hanzi: hanzi.trim().to_string(),
            pinyin: pinyin.trim().to_string(),
            meaning: meaning.trim().to_string(),
            hsk_level: clamp_hsk_level(hsk_level),
            category: category_or_default(category),
            mastered: false,
            difficulty: None,
            ease_factor: None,
            review_count: 0,
            last_reviewed: None,
            next_review: None,
        }
    }

    pub fn review_state(&self) -> ReviewState {
        ReviewState::from_stored(self.ease_factor, Some(self.review_count))
    }

    pub fn check_required(&self) -> Result<()> {
        for (name, value) in [
            ("hanzi", &self.hanzi),
            ("pinyin", &self.pinyin),
            ("meaning", &self.meaning),
        ] {
            if value.is_empty() {
                return Err(Error::MissingField(name));
            }
        }
        Ok(())
    }

    /// A copy with `edit` applied, normalised like [`Vocabulary::new`].
    /// Review history carries over unchanged.
    pub fn edited(&self, edit: WordEdit) -> Result<Vocabulary> {
        let mut next = self.clone();
        if let Some(hanzi) = edit.hanzi {
            next.hanzi = hanzi.trim().to_string();
        }
        if let Some(pinyin) = edit.pinyin {
            next.pinyin = pinyin.trim().to_string();
        }
        if let Some(meaning) = edit.meaning {
            next.meaning = meaning.trim().to_string();
        }
        if let Some(level) = edit.hsk_level {
            next.hsk_level = clamp_hsk_level(level);
        }
        if let Some(category) = edit.category {
            next.category = category_or_default(&category);
        }
        if let Some(mastered) = edit.mastered {
            next.mastered = mastered;
        }
        next.check_required()?;
        Ok(next)
    }
}

/// Partial update of a word's content. Absent fields stay as they are.
#[derive(Debug, Default, Deserialize)]
pub struct WordEdit {
    pub hanzi: Option<String>,
    pub pinyin: Option<String>,
    pub meaning: Option<String>,
    pub hsk_level: Option<u8>,
    pub category: Option<String>,
    pub mastered: Option<bool>,
}

fn clamp_hsk_level(level: u8) -> u8 {
    if HSK_LEVELS.contains(&level) { level } else { 1 }
}

fn category_or_default(category: &str) -> String {
    let category = category.trim();
    if category.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        category.to_string()
    }
}

/// Extracts the digits of an HSK level such as `"HSK 3"`; anything outside
/// 1..=6 falls back to level 1.
pub fn normalize_hsk_level(raw: &str) -> u8 {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u8>() {
        Ok(level) if HSK_LEVELS.contains(&level) => level,
        _ => 1,
    }
}

fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| format!("bad timestamp {s:?}: {e}"))
}

fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "0" => Ok(false),
        "true" | "yes" | "1" => Ok(true),
        other => Err(format!("bad mastered flag {other:?}")),
    }
}

/// Header-name lookup so both the full store layout and the short
/// `Hanzi,Pinyin,Meaning,HSK Level,Category,Mastered` export load.
struct Columns(HashMap<String, usize>);

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let map = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase().replace(' ', "_"), i))
            .collect();
        Columns(map)
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.0
            .get(name)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
            .trim()
    }
}

fn parse_row(
    columns: &Columns,
    record: &csv::StringRecord,
) -> std::result::Result<Option<Vocabulary>, String> {
    let hanzi = columns.get(record, "hanzi");
    let pinyin = columns.get(record, "pinyin");
    let meaning = columns.get(record, "meaning");
    if hanzi.is_empty() || pinyin.is_empty() || meaning.is_empty() {
        return Ok(None);
    }

    let mut item = Vocabulary::new(
        hanzi,
        pinyin,
        meaning,
        normalize_hsk_level(columns.get(record, "hsk_level")),
        columns.get(record, "category"),
    );

    let id = columns.get(record, "id");
    if !id.is_empty() {
        item.id = id.to_string();
    }
    item.mastered = parse_bool(columns.get(record, "mastered"))?;

    let difficulty = columns.get(record, "difficulty");
    if !difficulty.is_empty() {
        item.difficulty = Some(difficulty.parse().map_err(|e: Error| e.to_string())?);
    }
    let ease = columns.get(record, "ease_factor");
    if !ease.is_empty() {
        item.ease_factor = Some(
            ease.parse()
                .map_err(|_| format!("bad ease factor {ease:?}"))?,
        );
    }
    let count = columns.get(record, "review_count");
    if !count.is_empty() {
        item.review_count = count
            .parse()
            .map_err(|_| format!("bad review count {count:?}"))?;
    }
    item.last_reviewed = parse_timestamp(columns.get(record, "last_reviewed"))?;
    item.next_review = parse_timestamp(columns.get(record, "next_review"))?;
    Ok(Some(item))
}

pub fn load_csv(path: &Path) -> Result<Vec<Vocabulary>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;

    let headers = reader.headers().map_err(|e| Error::csv(path, e))?.clone();
    let columns = Columns::from_headers(&headers);

    let mut items = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let row = i + 2;
        let record = result.map_err(|e| Error::csv(path, e))?;
        match parse_row(&columns, &record) {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {
                tracing::warn!(path = %path.display(), row, "skipping row without hanzi, pinyin and meaning");
            }
            Err(message) => {
                return Err(Error::InvalidRow {
                    path: path.to_path_buf(),
                    row,
                    message,
                });
            }
        }
    }
    tracing::debug!(path = %path.display(), count = items.len(), "loaded vocabulary");
    Ok(items)
}

pub fn save_csv(path: &Path, items: &[Vocabulary]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| Error::csv(path, e))?;

    writer
        .write_record(CSV_HEADER)
        .map_err(|e| Error::csv(path, e))?;

    for item in items {
        writer
            .write_record([
                item.id.clone(),
                item.hanzi.clone(),
                item.pinyin.clone(),
                item.meaning.clone(),
                item.hsk_level.to_string(),
                item.category.clone(),
                item.mastered.to_string(),
                item.difficulty.map_or(String::new(), |d| d.to_string()),
                item.ease_factor.map_or(String::new(), |v| v.to_string()),
                item.review_count.to_string(),
                item.last_reviewed.as_ref().map_or(String::new(), format_timestamp),
                item.next_review.as_ref().map_or(String::new(), format_timestamp),
            ])
            .map_err(|e| Error::csv(path, e))?;
    }

    writer.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}

pub fn discover_files(paths: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for p in paths {
        let path = PathBuf::from(p);
        if path.is_dir() {
            collect_csv_recursive(&path, &mut files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    files
}

fn collect_csv_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_csv_recursive(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
}

/// Every item loaded from a set of deck files, each remembering the file it
/// came from so writes go back to the right place.
#[derive(Debug, Default)]
pub struct Library {
    pub items: Vec<Vocabulary>,
    pub sources: Vec<PathBuf>,
    /// Every deck file that loaded, including empty ones.
    pub files: Vec<PathBuf>,
}

impl Library {
    /// Loads all CSV files under `paths`. Unreadable files are skipped with a
    /// warning.
    pub fn load(paths: &[String]) -> Result<Library> {
        let files = discover_files(paths);
        if files.is_empty() {
            return Err(Error::NoFiles);
        }

        let mut library = Library::default();
        for file in &files {
            match load_csv(file) {
                Ok(items) => {
                    library.sources.extend(std::iter::repeat_n(file.clone(), items.len()));
                    library.items.extend(items);
                    library.files.push(file.clone());
                }
                Err(e) => tracing::warn!("{e}"),
            }
        }
        tracing::info!(
            items = library.items.len(),
            files = files.len(),
            "vocabulary loaded"
        );
        Ok(library)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|v| v.id == id)
    }

    fn file_items<'a>(&'a self, target: &'a Path) -> impl Iterator<Item = (usize, &'a Vocabulary)> {
        self.items
            .iter()
            .zip(&self.sources)
            .enumerate()
            .filter(move |(_, (_, source))| source.as_path() == target)
            .map(|(i, (v, _))| (i, v))
    }

    pub fn save_source(&self, target: &Path) -> Result<()> {
        let items: Vec<Vocabulary> = self.file_items(target).map(|(_, v)| v.clone()).collect();
        save_csv(target, &items)
    }

    pub fn save_all(&self) -> Result<()> {
        let mut targets: Vec<&PathBuf> = self.sources.iter().collect();
        targets.sort();
        targets.dedup();
        for target in targets {
            self.save_source(target)?;
        }
        Ok(())
    }

    // The write-then-swap methods below leave memory untouched when the
    // file cannot be written.

    /// Replaces the item at `index` in its source file and in memory.
    pub fn commit(&mut self, index: usize, updated: Vocabulary) -> Result<()> {
        let target = self.sources[index].clone();
        let file_items: Vec<Vocabulary> = self
            .file_items(&target)
            .map(|(i, v)| if i == index { updated.clone() } else { v.clone() })
            .collect();
        save_csv(&target, &file_items)?;
        self.items[index] = updated;
        Ok(())
    }

    /// The file a new word of `category` belongs in: wherever that category
    /// already lives, else the first deck.
    pub fn target_for(&self, category: &str) -> Option<PathBuf> {
        self.items
            .iter()
            .zip(&self.sources)
            .find(|(v, _)| v.category == category)
            .map(|(_, source)| source.clone())
            .or_else(|| self.files.first().cloned())
    }

    /// Appends `item` to `target` and returns its index.
    pub fn insert(&mut self, item: Vocabulary, target: PathBuf) -> Result<usize> {
        item.check_required()?;
        let mut file_items: Vec<Vocabulary> =
            self.file_items(&target).map(|(_, v)| v.clone()).collect();
        file_items.push(item.clone());
        save_csv(&target, &file_items)?;

        tracing::info!(id = %item.id, hanzi = %item.hanzi, path = %target.display(), "word added");
        if !self.files.contains(&target) {
            self.files.push(target.clone());
        }
        self.items.push(item);
        self.sources.push(target);
        Ok(self.items.len() - 1)
    }

    pub fn remove(&mut self, index: usize) -> Result<Vocabulary> {
        let target = self.sources[index].clone();
        let file_items: Vec<Vocabulary> = self
            .file_items(&target)
            .filter(|(i, _)| *i != index)
            .map(|(_, v)| v.clone())
            .collect();
        save_csv(&target, &file_items)?;

        self.sources.remove(index);
        let removed = self.items.remove(index);
        tracing::info!(id = %removed.id, hanzi = %removed.hanzi, "word deleted");
        Ok(removed)
    }
}

// -- JSON import/export --

/// Looks `keys` up in order, first on the entry itself and then in a nested
/// `progress` object. A value of the wrong shape counts as absent.
fn field<T: DeserializeOwned>(entry: &Map<String, Value>, keys: &[&str]) -> Option<T> {
    let nested = entry.get("progress").and_then(Value::as_object);
    std::iter::once(entry)
        .chain(nested)
        .flat_map(|map| keys.iter().filter_map(move |k| map.get(*k)))
        .find_map(|v| serde_json::from_value(v.clone()).ok())
}

/// `hsk_level` wins over `hskLevel` unless it is blank or zero.
fn import_hsk_level(entry: &Map<String, Value>) -> u8 {
    ["hsk_level", "hskLevel"]
        .iter()
        .filter_map(|k| entry.get(*k))
        .find_map(|v| match v {
            Value::Number(n) if n.as_f64() != Some(0.0) => Some(normalize_hsk_level(&n.to_string())),
            Value::String(s) if !s.trim().is_empty() => Some(normalize_hsk_level(s)),
            _ => None,
        })
        .unwrap_or(1)
}

fn import_entry(entry: &Map<String, Value>) -> Option<Vocabulary> {
    let text = |key: &str| -> Option<String> {
        field::<String>(entry, &[key]).filter(|s| !s.trim().is_empty())
    };

    let mut item = Vocabulary::new(
        &text("hanzi")?,
        &text("pinyin")?,
        &text("meaning")?,
        import_hsk_level(entry),
        &text("category").unwrap_or_default(),
    );
    if let Some(id) = text("id") {
        item.id = id;
    }
    item.mastered = field(entry, &["mastered"]).unwrap_or(false);
    item.difficulty = field(entry, &["difficulty"]);
    item.ease_factor = field::<f64>(entry, &["ease_factor", "easeFactor"]).filter(|e| e.is_finite());
    item.review_count = field(entry, &["review_count", "reviewCount"]).unwrap_or(0);
    item.last_reviewed = field(entry, &["last_reviewed", "lastReviewed"]);
    item.next_review = field(entry, &["next_review", "nextReview"]);
    Some(item)
}

/// Parses a JSON array of vocabulary entries. Entries that are not objects or
/// lack hanzi, pinyin or meaning are skipped; malformed progress fields are
/// ignored.
pub fn import_json(text: &str) -> Result<Vec<Vocabulary>> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(entries) = value else {
        return Err(Error::NotAnArray);
    };

    let total = entries.len();
    let items: Vec<Vocabulary> = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(import_entry)
        .collect();

    if items.len() < total {
        tracing::warn!(skipped = total - items.len(), "skipped invalid import entries");
    }
    Ok(items)
}

pub fn export_json(items: &[Vocabulary]) -> Result<String> {
    Ok(serde_json::to_string_pretty(items)?)
}

/// Short human-facing export without review history.
pub fn export_summary_csv(path: &Path, items: &[Vocabulary]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| Error::csv(path, e))?;
    writer
        .write_record(["Hanzi", "Pinyin", "Meaning", "HSK Level", "Category", "Mastered"])
        .map_err(|e| Error::csv(path, e))?;
    for item in items {
        let level = item.hsk_level.to_string();
        writer
            .write_record([
                item.hanzi.as_str(),
                item.pinyin.as_str(),
                item.meaning.as_str(),
                level.as_str(),
                item.category.as_str(),
                if item.mastered { "Yes" } else { "No" },
            ])
            .map_err(|e| Error::csv(path, e))?;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn hsk_level_normalization() {
        assert_eq!(normalize_hsk_level("3"), 3);
        assert_eq!(normalize_hsk_level("HSK 5"), 5);
        assert_eq!(normalize_hsk_level("9"), 1);
        assert_eq!(normalize_hsk_level(""), 1);
        assert_eq!(normalize_hsk_level("abc"), 1);
    }

    #[test]
    fn new_item_has_no_history() {
        let item = Vocabulary::new("你好", "nǐ hǎo", "halo", 1, "");
        assert_eq!(item.category, DEFAULT_CATEGORY);
        assert_eq!(item.review_count, 0);
        assert!(item.next_review.is_none());
        assert_eq!(item.review_state(), ReviewState::default());
        assert!(!item.id.is_empty());
    }

    #[test]
    fn csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hsk1.csv");

        let mut item = Vocabulary::new("谢谢", "xiè xie", "terima kasih", 1, "Salam");
        item.id = "test-id-1".into();
        item.mastered = true;
        item.difficulty = Some(Difficulty::Hard);
        item.ease_factor = Some(2.35);
        item.review_count = 4;
        item.last_reviewed = Some(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        item.next_review = Some(Utc.with_ymd_and_hms(2025, 6, 6, 8, 0, 0).unwrap());

        save_csv(&path, std::slice::from_ref(&item)).unwrap();
        let loaded = load_csv(&path).unwrap();
        assert_eq!(loaded, vec![item]);
    }

    #[test]
    fn csv_sparse_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.csv");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "{}", CSV_HEADER.join(",")).unwrap();
            writeln!(f, ",水,shuǐ,air,,,,,,,,").unwrap();
            writeln!(f, ",,,,,,,,,,,").unwrap();
        }
        let items = load_csv(&path).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].hanzi, "水");
        assert_eq!(items[0].hsk_level, 1);
        assert_eq!(items[0].category, DEFAULT_CATEGORY);
        assert!(!items[0].id.is_empty());
        assert!(items[0].ease_factor.is_none());
        assert!(items[0].next_review.is_none());
    }

    #[test]
    fn csv_loads_summary_export_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        std::fs::write(
            &path,
            "Hanzi,Pinyin,Meaning,HSK Level,Category,Mastered\n茶,chá,teh,1,Makanan,Yes\n",
        )
        .unwrap();
        let items = load_csv(&path).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, "Makanan");
        assert!(items[0].mastered);
    }

    #[test]
    fn csv_rejects_unknown_difficulty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "hanzi,pinyin,meaning,difficulty\n饭,fàn,nasi,good\n",
        )
        .unwrap();
        let err = load_csv(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidRow { row: 2, .. }));
    }

    #[test]
    fn json_import_skips_incomplete_entries() {
        let text = r#"[
            {"hanzi": "学习", "pinyin": "xué xí", "meaning": "belajar", "hskLevel": "HSK 2"},
            {"hanzi": "工作", "pinyin": "gōng zuò"},
            {"hanzi": "老师", "pinyin": "lǎo shī", "meaning": "guru", "hsk_level": 9, "category": "Profesi"},
            42
        ]"#;
        let items = import_json(text).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].hsk_level, 2);
        assert_eq!(items[0].category, DEFAULT_CATEGORY);
        assert_eq!(items[1].hsk_level, 1);
        assert_eq!(items[1].category, "Profesi");
    }

    #[test]
    fn json_import_prefers_snake_case_level() {
        let text = r#"[
            {"hanzi": "学习", "pinyin": "xué xí", "meaning": "belajar", "hsk_level": 2, "hskLevel": "HSK 4"},
            {"hanzi": "工作", "pinyin": "gōng zuò", "meaning": "kerja", "hsk_level": "", "hskLevel": "HSK 3"}
        ]"#;
        let items = import_json(text).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].hsk_level, 2);
        assert_eq!(items[1].hsk_level, 3);
    }

    #[test]
    fn json_import_ignores_malformed_progress() {
        let text = r#"[
            {"hanzi": "学习", "pinyin": "xué xí", "meaning": "belajar", "mastered": null},
            {"hanzi": "书", "pinyin": "shū", "meaning": "buku", "difficulty": "good",
             "review_count": -3, "ease_factor": "high", "next_review": "tomorrow"}
        ]"#;
        let items = import_json(text).unwrap();
        assert_eq!(items.len(), 2);
        assert!(!items[0].mastered);
        assert!(items[1].difficulty.is_none());
        assert_eq!(items[1].review_count, 0);
        assert!(items[1].ease_factor.is_none());
        assert!(items[1].next_review.is_none());
    }

    #[test]
    fn json_import_reads_nested_progress() {
        let text = r#"[{
            "hanzi": "猫", "pinyin": "māo", "meaning": "kucing", "hsk_level": 1,
            "progress": {"mastered": true, "difficulty": "hard", "review_count": 4, "ease_factor": 2.2}
        }]"#;
        let items = import_json(text).unwrap();
        assert!(items[0].mastered);
        assert_eq!(items[0].difficulty, Some(Difficulty::Hard));
        assert_eq!(items[0].review_count, 4);
        assert_eq!(items[0].ease_factor, Some(2.2));
    }

    #[test]
    fn edit_normalises_and_keeps_history() {
        let mut item = Vocabulary::new("狗", "gǒu", "anjing", 1, "Hewan");
        item.review_count = 2;
        let edited = item
            .edited(WordEdit {
                meaning: Some(" anjing (hewan) ".into()),
                hsk_level: Some(9),
                category: Some("  ".into()),
                ..WordEdit::default()
            })
            .unwrap();
        assert_eq!(edited.meaning, "anjing (hewan)");
        assert_eq!(edited.hsk_level, 1);
        assert_eq!(edited.category, DEFAULT_CATEGORY);
        assert_eq!(edited.review_count, 2);
        assert_eq!(edited.id, item.id);

        let blank = item.edited(WordEdit {
            hanzi: Some(" ".into()),
            ..WordEdit::default()
        });
        assert!(matches!(blank, Err(Error::MissingField("hanzi"))));
    }

    #[test]
    fn library_insert_and_remove_rewrite_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("deck.csv");
        save_csv(&deck, &[Vocabulary::new("你好", "nǐ hǎo", "halo", 1, "Salam")]).unwrap();
        let mut library = Library::load(&[dir.path().to_str().unwrap().to_string()]).unwrap();

        let target = library.target_for("Makanan").unwrap();
        assert_eq!(target, deck);
        let index = library
            .insert(Vocabulary::new("饭", "fàn", "nasi", 1, "Makanan"), target)
            .unwrap();
        assert_eq!(load_csv(&deck).unwrap().len(), 2);

        let removed = library.remove(0).unwrap();
        assert_eq!(removed.hanzi, "你好");
        assert_eq!(library.items.len(), 1);
        assert_eq!(library.sources.len(), 1);
        assert_eq!(index, 1);
        let on_disk = load_csv(&deck).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].hanzi, "饭");
    }

    #[test]
    fn library_insert_rejects_blank_words() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("deck.csv");
        save_csv(&deck, &[]).unwrap();
        let mut library = Library::load(&[deck.to_str().unwrap().to_string()]).unwrap();
        assert!(library.items.is_empty());
        assert_eq!(library.target_for("Umum"), Some(deck.clone()));

        let err = library
            .insert(Vocabulary::new("水", "", "air", 1, ""), deck.clone())
            .unwrap_err();
        assert!(matches!(err, Error::MissingField("pinyin")));
        assert!(library.items.is_empty());
        assert!(load_csv(&deck).unwrap().is_empty());
    }

    #[test]
    fn json_import_rejects_non_array() {
        assert!(matches!(
            import_json(r#"{"hanzi": "我"}"#),
            Err(Error::NotAnArray)
        ));
    }

    #[test]
    fn json_export_reimports() {
        let mut item = Vocabulary::new("朋友", "péng you", "teman", 2, "Hubungan");
        item.review_count = 3;
        item.ease_factor = Some(2.6);
        let text = export_json(std::slice::from_ref(&item)).unwrap();
        let back = import_json(&text).unwrap();
        assert_eq!(back, vec![item]);
    }

    #[test]
    fn library_commit_writes_only_the_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        save_csv(&a, &[Vocabulary::new("你好", "nǐ hǎo", "halo", 1, "Salam")]).unwrap();
        save_csv(&b, &[Vocabulary::new("他", "tā", "dia", 1, "Kata Ganti")]).unwrap();
        let b_before = std::fs::read_to_string(&b).unwrap();

        let mut library = Library::load(&[dir.path().to_str().unwrap().to_string()]).unwrap();
        assert_eq!(library.items.len(), 2);

        let index = library.sources.iter().position(|s| *s == a).unwrap();
        let mut updated = library.items[index].clone();
        updated.mastered = true;
        let id = updated.id.clone();
        library.commit(index, updated).unwrap();

        assert!(library.items[library.position(&id).unwrap()].mastered);
        assert!(load_csv(&a).unwrap()[0].mastered);
        assert_eq!(std::fs::read_to_string(&b).unwrap(), b_before);
    }

    #[test]
    fn library_needs_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = Library::load(&[dir.path().to_str().unwrap().to_string()]).unwrap_err();
        assert!(matches!(err, Error::NoFiles));
    }

    #[test]
    fn discover_files_works() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(dir.path().join("a.csv"), "").unwrap();
        std::fs::write(sub.join("b.csv"), "").unwrap();
        std::fs::write(dir.path().join("c.txt"), "").unwrap();

        let files = discover_files(&[dir.path().to_str().unwrap().to_string()]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "csv"));
    }
}
