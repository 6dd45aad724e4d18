use crate::model::{AUDIO_TABLE, EPISODES_TABLE, PEOPLE_TABLE, SHOWS_TABLE};

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    /// Arrays and objects, stored as JSON text
    Json,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::Json => "TEXT",
            ColumnType::Integer => "INTEGER",
        }
    }
}

/// Columns of one metadata table
#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [(&'static str, ColumnType)],
    /// Column sets that must be unique, besides `id`
    pub unique: &'static [&'static [&'static str]],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, ty)| *ty)
    }

    /// `CREATE TABLE` plus unique indexes
    pub fn ddl(&self) -> Vec<String> {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|(name, ty)| {
                if *name == "id" {
                    format!("\"{name}\" {} PRIMARY KEY", ty.sql())
                } else {
                    format!("\"{name}\" {}", ty.sql())
                }
            })
            .collect();

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            self.name,
            columns.join(", ")
        )];

        for unique in self.unique {
            let quoted: Vec<String> = unique.iter().map(|c| format!("\"{c}\"")).collect();
            statements.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS \"ux_{}_{}\" ON \"{}\" ({})",
                self.name.to_lowercase(),
                unique.join("_").to_lowercase(),
                self.name,
                quoted.join(", ")
            ));
        }

        statements
    }
}

const SCHEMA: &[TableSchema] = &[
    TableSchema {
        name: SHOWS_TABLE,
        columns: &[
            ("id", ColumnType::Text),
            ("title", ColumnType::Text),
            ("sanitizedTitle", ColumnType::Text),
            ("description", ColumnType::Text),
            ("imageUrl", ColumnType::Text),
            ("rssUrl", ColumnType::Text),
            ("websiteUrl", ColumnType::Text),
            ("language", ColumnType::Text),
            ("tags", ColumnType::Json),
            ("lastUpdated", ColumnType::Text),
        ],
        unique: &[&["sanitizedTitle"]],
    },
    TableSchema {
        name: EPISODES_TABLE,
        columns: &[
            ("id", ColumnType::Text),
            ("showId", ColumnType::Text),
            ("title", ColumnType::Text),
            ("sanitizedTitle", ColumnType::Text),
            ("description", ColumnType::Text),
            ("publishedDate", ColumnType::Text),
            ("durationSeconds", ColumnType::Integer),
            ("originalAudioUrl", ColumnType::Text),
            ("audioId", ColumnType::Text),
        ],
        unique: &[&["showId", "originalAudioUrl"]],
    },
    TableSchema {
        name: AUDIO_TABLE,
        columns: &[
            ("id", ColumnType::Text),
            ("gcsBucket", ColumnType::Text),
            ("gcsObjectPath", ColumnType::Text),
            ("fileSize", ColumnType::Integer),
            ("contentHash", ColumnType::Text),
        ],
        unique: &[&["gcsBucket", "gcsObjectPath"]],
    },
    TableSchema {
        name: PEOPLE_TABLE,
        columns: &[
            ("id", ColumnType::Text),
            ("fullName", ColumnType::Text),
            ("aliases", ColumnType::Json),
            ("audioId", ColumnType::Text),
        ],
        unique: &[],
    },
];

/// Look up a known table
pub fn table_schema(name: &str) -> Option<&'static TableSchema> {
    SCHEMA.iter().find(|t| t.name == name)
}

/// Every known table
pub fn all_tables() -> &'static [TableSchema] {
    SCHEMA
}
