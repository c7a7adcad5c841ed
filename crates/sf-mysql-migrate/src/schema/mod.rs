//! Schema synthesis: field descriptors to MySQL column specifications.
//!
//! Synthesis is a pure function over the remote metadata; running it twice
//! on the same descriptor sequence yields identical specifications.

use tracing::{debug, warn};

use crate::source::FieldDescriptor;

/// Known source field-type tags.
///
/// Dispatch over this enum is total: every tag either maps to a column
/// specification or is explicitly dropped. Unrecognized tags are carried
/// in `Unknown` and surfaced as a synthesis warning, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Id,
    String,
    Url,
    Textarea,
    Email,
    Phone,
    Combobox,
    Picklist,
    Multipicklist,
    Reference,
    Int,
    DateTime,
    Date,
    Boolean,
    Time,
    Double,
    Currency,
    Percent,
    Base64,
    Address,
    Location,
    EncryptedString,
    Unknown(std::string::String),
}

impl FieldType {
    /// Parse a wire type tag. Tags are matched case-insensitively.
    pub fn parse(tag: &str) -> FieldType {
        match tag.to_ascii_lowercase().as_str() {
            "id" => FieldType::Id,
            "string" => FieldType::String,
            "url" => FieldType::Url,
            "textarea" => FieldType::Textarea,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "combobox" => FieldType::Combobox,
            "picklist" => FieldType::Picklist,
            "multipicklist" => FieldType::Multipicklist,
            "reference" => FieldType::Reference,
            "int" => FieldType::Int,
            "datetime" => FieldType::DateTime,
            "date" => FieldType::Date,
            "boolean" => FieldType::Boolean,
            "time" => FieldType::Time,
            "double" => FieldType::Double,
            "currency" => FieldType::Currency,
            "percent" => FieldType::Percent,
            "base64" => FieldType::Base64,
            "address" => FieldType::Address,
            "location" => FieldType::Location,
            "encryptedstring" => FieldType::EncryptedString,
            _ => FieldType::Unknown(tag.to_string()),
        }
    }
}

/// One synthesized target column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name (same as the field name).
    pub name: String,

    /// MySQL type string, e.g. "varchar(18)", "decimal(18,2)".
    pub sql_type: String,

    /// Whether the column accepts NULL.
    pub nullable: bool,

    /// Whether the column is realized as a foreign key in phase two.
    pub is_foreign_key: bool,

    /// Referenced object. For foreign keys this drives the constraint;
    /// for polymorphic references it is informational only.
    pub lookup_target: Option<String>,

    /// Relationship name, recorded for single-target references.
    pub relationship_name: Option<String>,
}

/// One synthesized target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name (same as the object name).
    pub name: String,

    /// Columns in field-descriptor order.
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Columns created with the table in phase one.
    pub fn non_fk_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.is_foreign_key)
    }

    /// Columns added by phase two.
    pub fn fk_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.is_foreign_key)
    }

    /// All retained column names, in order. This is the export projection.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Synthesize the column specification for one field descriptor.
///
/// Returns `None` for field types that produce no column (`address`,
/// `location`, `encryptedstring`), for descriptors without a name, and
/// for unrecognized type tags (logged as a warning).
pub fn synthesize_column(field: &FieldDescriptor) -> Option<ColumnSpec> {
    // Nameless descriptors never produce a column, whatever their type.
    if field.name.is_empty() {
        warn!("Skipping field descriptor without a name");
        return None;
    }

    let scalar = |sql_type: String, nullable: bool| {
        Some(ColumnSpec {
            name: field.name.clone(),
            sql_type,
            nullable,
            is_foreign_key: false,
            lookup_target: None,
            relationship_name: None,
        })
    };

    match FieldType::parse(&field.field_type) {
        FieldType::Id => scalar("varchar(18)".to_string(), false),

        FieldType::String
        | FieldType::Url
        | FieldType::Textarea
        | FieldType::Email
        | FieldType::Phone
        | FieldType::Combobox
        | FieldType::Multipicklist => scalar(string_type(field.length), true),

        // Picklists get a fixed width regardless of the declared length.
        FieldType::Picklist => scalar("varchar(60)".to_string(), true),

        FieldType::Reference => Some(synthesize_reference(field)),

        FieldType::Int => scalar("int".to_string(), field.nillable),
        FieldType::DateTime => scalar("datetime".to_string(), field.nillable),
        FieldType::Date => scalar("date".to_string(), field.nillable),

        // Booleans are stored as "true"/"false" strings. Time shares the
        // encoding; see DESIGN.md for that compatibility decision.
        FieldType::Boolean | FieldType::Time => scalar("varchar(5)".to_string(), field.nillable),

        FieldType::Double | FieldType::Currency | FieldType::Percent => scalar(
            format!("decimal({},{})", field.precision, field.scale),
            field.nillable,
        ),

        FieldType::Base64 => scalar("text".to_string(), field.nillable),

        // Compound and encrypted types have no relational representation.
        FieldType::Address | FieldType::Location | FieldType::EncryptedString => {
            debug!("Dropping {} field '{}'", field.field_type, field.name);
            None
        }

        FieldType::Unknown(tag) => {
            warn!(
                "Unrecognized field type '{}' for '{}', no column emitted",
                tag, field.name
            );
            None
        }
    }
}

/// String-like fields over 200 characters spill into `text`.
fn string_type(length: u32) -> String {
    if length > 200 {
        "text".to_string()
    } else {
        format!("varchar({length})")
    }
}

/// A reference becomes a foreign key only when it has exactly one
/// possible target and is not polymorphic. Polymorphic references keep
/// their first declared target informationally; no constraint is ever
/// generated for them.
fn synthesize_reference(field: &FieldDescriptor) -> ColumnSpec {
    let single_target = !field.polymorphic_foreign_key && field.reference_to.len() == 1;

    ColumnSpec {
        name: field.name.clone(),
        sql_type: format!("varchar({})", field.length),
        nullable: true,
        is_foreign_key: single_target,
        lookup_target: field.reference_to.first().cloned(),
        relationship_name: if single_target {
            field.relationship_name.clone()
        } else {
            None
        },
    }
}

/// Synthesize the full table specification for one object.
pub fn synthesize_table(object: &str, fields: &[FieldDescriptor]) -> TableSpec {
    let columns = fields.iter().filter_map(synthesize_column).collect();
    TableSpec {
        name: object.to_string(),
        columns,
    }
}
