//! Bulletin files and folders.
//!
//! Each tenant owns a tree of rows rooted at a folder whose `parent_id` is
//! its own id. File contents live in the blob store under
//! `(parent_id, location)`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use crate::db::query::{Filter, Page, SortColumn};
use crate::db::DbResult;
use crate::util::{current_timestamp, datetime_format, new_id};

/// Name of every tenant's root folder.
pub const ROOT_FOLDER_NAME: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Doc,
    Visual,
    Aural,
    Virtual,
    Folder,
    Other,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Visual => "visual",
            Self::Aural => "aural",
            Self::Virtual => "virtual",
            Self::Folder => "folder",
            Self::Other => "other",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pdf" => Self::Pdf,
            "doc" => Self::Doc,
            "visual" => Self::Visual,
            "aural" => Self::Aural,
            "virtual" => Self::Virtual,
            "folder" => Self::Folder,
            "other" => Self::Other,
            _ => return None,
        })
    }
}

impl ToSql for FileType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FileType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Self::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

static DOC_EXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\.(eml|doc|docx|ppt|pptx|yml|xml|htm|json|csv|txt|ini|xls|xlsx|wps|rtf|hlp|pages|numbers|key|md|py|js|java|c|cpp|h|php|go|ts|sh|cs|kt|html|sql)$",
    )
    .expect("doc extension pattern is valid")
});
static AURAL_EXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(wav|flac|ape|alac|wavpack|wv|mp3|aac|ogg|vorbis|opus)$")
        .expect("aural extension pattern is valid")
});
static VISUAL_EXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\.(jpg|jpeg|png|tif|gif|pcx|tga|exif|fpx|svg|psd|cdr|pcd|dxf|ufo|eps|ai|raw|wmf|webp|avif|apng|icon|ico|mpg|mpeg|avi|rm|rmvb|mov|wmv|asf|dat|asx|wvx|mpe|mpa|mp4)$",
    )
    .expect("visual extension pattern is valid")
});
static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([^.]+)$").expect("extension pattern is valid"));

/// Classify an uploaded file by its name's extension (case-insensitive).
pub fn filename_type(name: &str) -> FileType {
    let name = name.to_lowercase();
    if name.ends_with(".pdf") {
        FileType::Pdf
    } else if DOC_EXT.is_match(&name) {
        FileType::Doc
    } else if AURAL_EXT.is_match(&name) {
        FileType::Aural
    } else if VISUAL_EXT.is_match(&name) {
        FileType::Visual
    } else {
        FileType::Other
    }
}

/// `Content-Type` for serving a stored file, from its name's last extension.
///
/// Visual files are `image/<ext>`, everything else `application/<ext>`.
/// Names without an extension yield `None`.
pub fn guess_content_type(name: &str, file_type: FileType) -> Option<String> {
    let ext = EXTENSION.captures(name)?.get(1)?.as_str();
    Some(if file_type == FileType::Visual {
        format!("image/{ext}")
    } else {
        format!("application/{ext}")
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct File {
    pub id: String,
    pub parent_id: String,
    pub tenant_id: String,
    pub created_by: String,
    pub name: String,
    /// Blob key within the parent folder's bucket; empty for folders.
    pub location: String,
    pub size: i64,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub source_type: String,
    pub create_time: i64,
    pub create_date: String,
    pub update_time: i64,
    pub update_date: String,
}

impl File {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            parent_id: row.get("parent_id")?,
            tenant_id: row.get("tenant_id")?,
            created_by: row.get("created_by")?,
            name: row.get("name")?,
            location: row.get("location")?,
            size: row.get("size")?,
            file_type: row.get("type")?,
            source_type: row.get("source_type")?,
            create_time: row.get("create_time")?,
            create_date: row.get("create_date")?,
            update_time: row.get("update_time")?,
            update_date: row.get("update_date")?,
        })
    }

    pub fn is_folder(&self) -> bool {
        self.file_type == FileType::Folder
    }
}

/// A listing row: the file plus folder-only extras.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    #[serde(flatten)]
    pub file: File,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_child_folder: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileOrder {
    Id,
    Name,
    Type,
    Size,
    Location,
    #[default]
    CreateTime,
    CreateDate,
    UpdateTime,
    UpdateDate,
}

impl FileOrder {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Self::Id,
            "name" => Self::Name,
            "type" => Self::Type,
            "size" => Self::Size,
            "location" => Self::Location,
            "create_time" => Self::CreateTime,
            "create_date" => Self::CreateDate,
            "update_time" => Self::UpdateTime,
            "update_date" => Self::UpdateDate,
            _ => return None,
        })
    }
}

impl SortColumn for FileOrder {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Type => "type",
            Self::Size => "size",
            Self::Location => "location",
            Self::CreateTime => "create_time",
            Self::CreateDate => "create_date",
            Self::UpdateTime => "update_time",
            Self::UpdateDate => "update_date",
        }
    }
}

/// Fields of a row to insert.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub parent_id: String,
    pub tenant_id: String,
    pub created_by: String,
    pub name: String,
    pub location: String,
    pub size: i64,
    pub file_type: FileType,
}

pub struct FileService;

impl FileService {
    pub fn get_by_id(conn: &Connection, id: &str) -> DbResult<Option<File>> {
        Ok(conn
            .query_row("SELECT * FROM file WHERE id = ?1", params![id], File::from_row)
            .optional()?)
    }

    /// Like [`FileService::get_by_id`], but rows of other tenants are invisible.
    pub fn get_tenant_file(conn: &Connection, tenant_id: &str, id: &str) -> DbResult<Option<File>> {
        Ok(conn
            .query_row(
                "SELECT * FROM file WHERE id = ?1 AND tenant_id = ?2",
                params![id, tenant_id],
                File::from_row,
            )
            .optional()?)
    }

    /// The tenant's root folder, created on first use.
    pub fn get_root_folder(conn: &Connection, tenant_id: &str) -> DbResult<File> {
        let existing = conn
            .query_row(
                "SELECT * FROM file WHERE tenant_id = ?1 AND parent_id = id
                 ORDER BY create_time ASC LIMIT 1",
                params![tenant_id],
                File::from_row,
            )
            .optional()?;
        if let Some(root) = existing {
            return Ok(root);
        }

        let id = new_id();
        let root = Self::insert_with_id(
            conn,
            id.clone(),
            NewFile {
                parent_id: id,
                tenant_id: tenant_id.to_string(),
                created_by: tenant_id.to_string(),
                name: ROOT_FOLDER_NAME.to_string(),
                location: String::new(),
                size: 0,
                file_type: FileType::Folder,
            },
        )?;
        info!("Created root folder {} for tenant {tenant_id}", root.id);
        Ok(root)
    }

    /// One page of the children of `pf_id` plus the total child count.
    ///
    /// `keywords` narrows to names containing it, ignoring case. The folder
    /// itself is never listed, which matters for the self-parented root.
    pub fn get_by_pf_id(
        conn: &Connection,
        tenant_id: &str,
        pf_id: &str,
        page: &Page<FileOrder>,
        keywords: Option<&str>,
    ) -> DbResult<(Vec<FileEntry>, u64)> {
        let f = Filter::new()
            .eq("tenant_id", Some(tenant_id))
            .eq("parent_id", Some(pf_id))
            .ne("id", pf_id)
            .contains_ci("name", keywords);
        let where_sql = f.where_sql();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM file{where_sql}"),
            params_from_iter(f.params()),
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!("SELECT * FROM file{where_sql}{}", page.tail_sql()))?;
        let files = stmt
            .query_map(params_from_iter(f.params()), File::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let has_child_folder = if file.is_folder() {
                Some(Self::has_child_folder(conn, &file.id)?)
            } else {
                None
            };
            entries.push(FileEntry {
                file,
                has_child_folder,
            });
        }
        Ok((entries, u64::try_from(total).unwrap_or_default()))
    }

    pub fn has_child_folder(conn: &Connection, folder_id: &str) -> DbResult<bool> {
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM file WHERE parent_id = ?1 AND id != ?1 AND type = ?2)",
            params![folder_id, FileType::Folder],
            |row| row.get(0),
        )?)
    }

    /// The folder containing `file_id`; the root is its own parent.
    pub fn get_parent_folder(conn: &Connection, file_id: &str) -> DbResult<Option<File>> {
        Ok(conn
            .query_row(
                "SELECT p.* FROM file f JOIN file p ON p.id = f.parent_id WHERE f.id = ?1",
                params![file_id],
                File::from_row,
            )
            .optional()?)
    }

    pub fn name_exists(conn: &Connection, tenant_id: &str, parent_id: &str, name: &str) -> DbResult<bool> {
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM file WHERE tenant_id = ?1 AND parent_id = ?2 AND name = ?3 AND id != ?2)",
            params![tenant_id, parent_id, name],
            |row| row.get(0),
        )?)
    }

    /// `name`, or the first of `name(1).ext`, `name(2).ext`, ... not yet
    /// used in the folder.
    pub fn duplicate_name(conn: &Connection, tenant_id: &str, parent_id: &str, name: &str) -> DbResult<String> {
        let mut candidate = name.to_string();
        while Self::name_exists(conn, tenant_id, parent_id, &candidate)? {
            candidate = next_duplicate_name(&candidate);
        }
        Ok(candidate)
    }

    pub fn insert(conn: &Connection, new: NewFile) -> DbResult<File> {
        Self::insert_with_id(conn, new_id(), new)
    }

    fn insert_with_id(conn: &Connection, id: String, new: NewFile) -> DbResult<File> {
        let now = current_timestamp();
        let date = datetime_format(now);
        let file = File {
            id,
            parent_id: new.parent_id,
            tenant_id: new.tenant_id,
            created_by: new.created_by,
            name: new.name,
            location: new.location,
            size: new.size,
            file_type: new.file_type,
            source_type: String::new(),
            create_time: now,
            create_date: date.clone(),
            update_time: now,
            update_date: date,
        };
        conn.execute(
            "INSERT INTO file (id, parent_id, tenant_id, created_by, name, location, size, type,
                               source_type, create_time, create_date, update_time, update_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                file.id,
                file.parent_id,
                file.tenant_id,
                file.created_by,
                file.name,
                file.location,
                file.size,
                file.file_type,
                file.source_type,
                file.create_time,
                file.create_date,
                file.update_time,
                file.update_date
            ],
        )?;
        Ok(file)
    }
}

/// `report.pdf` → `report(1).pdf` → `report(2).pdf`.
fn next_duplicate_name(name: &str) -> String {
    static COUNTER: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\(([0-9]+)\)$").expect("counter pattern is valid"));

    let ext = Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stem = &name[..name.len() - ext.len()];
    let (base, count) = match COUNTER.captures(stem) {
        Some(caps) => {
            let n: u64 = caps[1].parse().unwrap_or(0);
            (&stem[..caps.get(0).map_or(stem.len(), |m| m.start())], n)
        }
        None => (stem, 0),
    };
    format!("{base}({}){ext}", count + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_conn;

    fn page(page: u32, page_size: u32) -> Page<FileOrder> {
        Page {
            page,
            page_size,
            orderby: FileOrder::Name,
            desc: false,
        }
    }

    fn add(conn: &Connection, tenant: &str, parent: &str, name: &str, file_type: FileType) -> File {
        FileService::insert(
            conn,
            NewFile {
                parent_id: parent.to_string(),
                tenant_id: tenant.to_string(),
                created_by: tenant.to_string(),
                name: name.to_string(),
                location: if file_type == FileType::Folder {
                    String::new()
                } else {
                    name.to_string()
                },
                size: 3,
                file_type,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_root_folder_created_once() {
        let conn = test_conn();
        let root = FileService::get_root_folder(&conn, "t1").unwrap();
        assert_eq!(root.parent_id, root.id);
        assert_eq!(root.name, "/");
        assert!(root.is_folder());
        assert_eq!(FileService::get_root_folder(&conn, "t1").unwrap().id, root.id);
        assert_ne!(FileService::get_root_folder(&conn, "t2").unwrap().id, root.id);
    }

    #[test]
    fn test_listing_children_of_root() {
        let conn = test_conn();
        let root = FileService::get_root_folder(&conn, "t1").unwrap();
        let docs = add(&conn, "t1", &root.id, "docs", FileType::Folder);
        add(&conn, "t1", &docs.id, "nested", FileType::Folder);
        add(&conn, "t1", &root.id, "Report.PDF", FileType::Pdf);
        add(&conn, "t1", &docs.id, "inside.txt", FileType::Doc);

        let (entries, total) = FileService::get_by_pf_id(&conn, "t1", &root.id, &page(1, 15), None).unwrap();
        assert_eq!(total, 2);
        let names: Vec<_> = entries.iter().map(|e| e.file.name.as_str()).collect();
        assert_eq!(names, ["Report.PDF", "docs"]);
        assert_eq!(entries[1].has_child_folder, Some(true));
        assert_eq!(entries[0].has_child_folder, None);

        let (entries, total) =
            FileService::get_by_pf_id(&conn, "t1", &root.id, &page(1, 15), Some("report")).unwrap();
        assert_eq!(total, 1);
        assert_eq!(entries[0].file.name, "Report.PDF");

        let (entries, total) = FileService::get_by_pf_id(&conn, "t1", &root.id, &page(2, 1), None).unwrap();
        assert_eq!(total, 2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file.name, "docs");
    }

    #[test]
    fn test_listing_is_tenant_scoped() {
        let conn = test_conn();
        let root = FileService::get_root_folder(&conn, "t1").unwrap();
        add(&conn, "t1", &root.id, "mine.txt", FileType::Doc);
        let (_, total) = FileService::get_by_pf_id(&conn, "t2", &root.id, &page(1, 15), None).unwrap();
        assert_eq!(total, 0);
        assert!(FileService::get_tenant_file(&conn, "t2", &root.id).unwrap().is_none());
        assert!(FileService::get_tenant_file(&conn, "t1", &root.id).unwrap().is_some());
    }

    #[test]
    fn test_parent_folder() {
        let conn = test_conn();
        let root = FileService::get_root_folder(&conn, "t1").unwrap();
        let docs = add(&conn, "t1", &root.id, "docs", FileType::Folder);
        assert_eq!(FileService::get_parent_folder(&conn, &docs.id).unwrap().unwrap().id, root.id);
        assert_eq!(FileService::get_parent_folder(&conn, &root.id).unwrap().unwrap().id, root.id);
        assert!(FileService::get_parent_folder(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_name() {
        let conn = test_conn();
        let root = FileService::get_root_folder(&conn, "t1").unwrap();
        assert_eq!(FileService::duplicate_name(&conn, "t1", &root.id, "a.txt").unwrap(), "a.txt");
        add(&conn, "t1", &root.id, "a.txt", FileType::Doc);
        add(&conn, "t1", &root.id, "a(1).txt", FileType::Doc);
        assert_eq!(FileService::duplicate_name(&conn, "t1", &root.id, "a.txt").unwrap(), "a(2).txt");
    }

    #[test]
    fn test_next_duplicate_name() {
        assert_eq!(next_duplicate_name("report.pdf"), "report(1).pdf");
        assert_eq!(next_duplicate_name("report(1).pdf"), "report(2).pdf");
        assert_eq!(next_duplicate_name("notes"), "notes(1)");
        assert_eq!(next_duplicate_name("archive.tar.gz"), "archive.tar(1).gz");
    }

    #[test]
    fn test_filename_type() {
        assert_eq!(filename_type("Guide.PDF"), FileType::Pdf);
        assert_eq!(filename_type("notes.md"), FileType::Doc);
        assert_eq!(filename_type("sheet.xlsx"), FileType::Doc);
        assert_eq!(filename_type("song.mp3"), FileType::Aural);
        assert_eq!(filename_type("photo.JPG"), FileType::Visual);
        assert_eq!(filename_type("clip.mp4"), FileType::Visual);
        assert_eq!(filename_type("binary.bin"), FileType::Other);
        assert_eq!(filename_type("README"), FileType::Other);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(
            guess_content_type("photo.png", FileType::Visual).as_deref(),
            Some("image/png")
        );
        assert_eq!(
            guess_content_type("guide.v2.pdf", FileType::Pdf).as_deref(),
            Some("application/pdf")
        );
        assert_eq!(guess_content_type("README", FileType::Other), None);
        assert_eq!(guess_content_type("trailing.", FileType::Other), None);
    }
}
