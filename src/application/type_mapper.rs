use tracing::warn;

use crate::domain::engine::Engine;
use crate::domain::request::MigrationRequest;
use crate::domain::sql_type::SqlType;
use crate::domain::table::{ColumnDescriptor, TableDescriptor};
use crate::infrastructure::db::adapter::adapter_for;

/// Cross-engine column type translation.
///
/// Resolution order per column:
/// 1. an external override from the request, taken verbatim;
/// 2. the native per-pair table (engine-specific spellings the generic
///    model cannot reason about: UUID, JSON, ENUM, …);
/// 3. the reference model: the parsed [`SqlType`], adjusted to the
///    target's limits (lossy adjustments produce warnings, not errors).
pub struct TypeMapper {
    source: Engine,
    target: Engine,
}

impl TypeMapper {
    pub fn new(source: Engine, target: Engine) -> Self {
        Self { source, target }
    }

    /// Map every column of `table`, filling `target_type`,
    /// `target_rendered` and the LOB flag, and collecting clamp warnings.
    pub fn map_table(
        &self,
        table: &mut TableDescriptor,
        request: &MigrationRequest,
        warnings: &mut Vec<String>,
    ) {
        let table_name = table.name.0.clone();
        for column in &mut table.columns {
            let override_type = request.override_for(&table_name, &column.name.0);
            self.map_column(&table_name, column, override_type, warnings);
        }
    }

    pub fn map_column(
        &self,
        table_name: &str,
        column: &mut ColumnDescriptor,
        override_type: Option<&str>,
        warnings: &mut Vec<String>,
    ) {
        let mapped = if let Some(spec) = override_type {
            // overrides win over both orderings and are carried verbatim
            column.target_rendered = Some(spec.to_string());
            let parsed = SqlType::parse(self.target, spec);
            column.target_type = Some(parsed.clone());
            parsed
        } else {
            let mapped = self
                .native_map(&column.source_type)
                .unwrap_or_else(|| {
                    self.adjust_for_target(
                        table_name,
                        &column.name.0,
                        column.source_type.clone(),
                        warnings,
                    )
                });
            column.target_rendered = Some(adapter_for(self.target).render_type(&mapped));
            column.target_type = Some(mapped.clone());
            mapped
        };

        column.lob = mapped.is_lob();
        self.adjust_defaults(column);
    }

    /// Per-pair translations for engine-specific named types. Returns
    /// `None` when the reference model should decide.
    fn native_map(&self, source_type: &SqlType) -> Option<SqlType> {
        let SqlType::Other(name) = source_type else {
            return None;
        };
        let base = name
            .split('(')
            .next()
            .unwrap_or(name)
            .trim()
            .to_uppercase();
        match base.as_str() {
            "UUID" | "UNIQUEIDENTIFIER" => Some(match self.target {
                Engine::Postgres => SqlType::Other("UUID".to_string()),
                Engine::SqlServer => SqlType::Other("UNIQUEIDENTIFIER".to_string()),
                Engine::Oracle | Engine::Mysql => SqlType::Char(Some(36)),
            }),
            "JSON" | "JSONB" => Some(match self.target {
                Engine::Postgres => SqlType::Other("JSONB".to_string()),
                Engine::Mysql => SqlType::Other("JSON".to_string()),
                Engine::Oracle => SqlType::Clob,
                Engine::SqlServer => SqlType::Other("NVARCHAR(MAX)".to_string()),
            }),
            "INET" | "CIDR" | "MACADDR" => Some(SqlType::VarChar(Some(64))),
            "ENUM" | "SET" => Some(SqlType::VarChar(Some(255))),
            "MONEY" if self.source == Engine::Postgres => Some(SqlType::Decimal {
                precision: Some(19),
                scale: Some(4),
            }),
            _ => None,
        }
    }

    /// Reference fallback: keep the parsed type, widening or promoting
    /// where the target cannot hold it as declared.
    fn adjust_for_target(
        &self,
        table_name: &str,
        column_name: &str,
        ty: SqlType,
        warnings: &mut Vec<String>,
    ) -> SqlType {
        let adjusted: Option<(String, SqlType)> = match &ty {
            SqlType::VarChar(Some(n)) => varchar_max(self.target)
                .filter(|max| n > max)
                .map(|_| {
                    (
                        format!("VARCHAR({n}) exceeds the target maximum, promoted to CLOB"),
                        SqlType::Clob,
                    )
                }),
            SqlType::Char(Some(n)) => char_max(self.target).filter(|max| n > max).map(|_| {
                (
                    format!("CHAR({n}) exceeds the target maximum, demoted to VARCHAR"),
                    SqlType::VarChar(Some(*n)),
                )
            }),
            SqlType::Decimal {
                precision: Some(p),
                scale,
            } => decimal_max(self.target).filter(|max| p > max).map(|max| {
                (
                    format!("NUMERIC({p}) exceeds the target maximum precision {max}"),
                    SqlType::Decimal {
                        precision: Some(max),
                        scale: *scale,
                    },
                )
            }),
            SqlType::VarBinary(Some(n)) | SqlType::Binary(Some(n)) => binary_max(self.target)
                .filter(|max| n > max)
                .map(|_| {
                    (
                        format!("binary({n}) exceeds the target maximum, promoted to BLOB"),
                        SqlType::Blob,
                    )
                }),
            _ => None,
        };

        match adjusted {
            Some((message, replacement)) => {
                warn!("{table_name}.{column_name}: {message}");
                warnings.push(format!("{table_name}.{column_name}: {message}"));
                replacement
            }
            None => ty,
        }
    }

    /// Post-translation column hygiene: server-side generators are
    /// stripped, and defaults that are session functions cannot be
    /// translated, so they become plain NULL.
    fn adjust_defaults(&self, column: &mut ColumnDescriptor) {
        column.server_default = None;

        if let Some(default) = &column.default {
            let normalized = default.trim().trim_end_matches("()").to_lowercase();
            if matches!(
                normalized.as_str(),
                "sysdate" | "systime" | "systimestamp" | "current_timestamp" | "getdate" | "now"
            ) {
                column.default = None;
            } else if normalized.contains("nextval(") {
                // sequence-backed default: that is an identity in disguise
                column.features.identity = true;
                column.default = None;
            }
        }
        if column.features.identity {
            column.default = None;
        }
    }
}

fn varchar_max(target: Engine) -> Option<u32> {
    match target {
        Engine::Oracle => Some(4000),
        Engine::SqlServer => Some(8000),
        Engine::Mysql => Some(65_535),
        Engine::Postgres => None,
    }
}

fn char_max(target: Engine) -> Option<u32> {
    match target {
        Engine::Oracle => Some(2000),
        Engine::SqlServer => Some(8000),
        Engine::Mysql => Some(255),
        Engine::Postgres => None,
    }
}

fn decimal_max(target: Engine) -> Option<u16> {
    match target {
        Engine::Oracle | Engine::SqlServer => Some(38),
        Engine::Mysql => Some(65),
        Engine::Postgres => None,
    }
}

fn binary_max(target: Engine) -> Option<u32> {
    match target {
        Engine::Oracle => Some(2000),
        Engine::SqlServer => Some(8000),
        Engine::Mysql => Some(65_535),
        Engine::Postgres => None,
    }
}
