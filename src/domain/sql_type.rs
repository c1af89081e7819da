use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::engine::Engine;

/// Engine-neutral column type.
///
/// Source catalogs hand back opaque type strings ("VARCHAR2(100)",
/// "nvarchar", "NUMBER(9,2)"); [`SqlType::parse`] lifts them into these
/// tagged variants so the type mapper can reason about width, precision
/// and signedness without string matching. Adapters render the variants
/// back into each target engine's concrete spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bool,
    /// Integer of `bytes` storage width (1, 2, 3, 4 or 8).
    Int { bytes: u8, signed: bool },
    Decimal {
        precision: Option<u16>,
        scale: Option<u16>,
    },
    /// Floating point of 4 or 8 bytes.
    Float { bytes: u8 },
    Char(Option<u32>),
    VarChar(Option<u32>),
    Text,
    Binary(Option<u32>),
    VarBinary(Option<u32>),
    Blob,
    Clob,
    Date,
    Time,
    Timestamp { tz: bool },
    Xml,
    /// Anything the reference model does not cover (UUID, JSON, arrays…).
    /// Carried verbatim and rendered as-is.
    Other(String),
}

impl SqlType {
    /// Whether values of this type must travel through the LOB path
    /// (chunked streaming) instead of the plain batch loop.
    pub fn is_lob(&self) -> bool {
        matches!(self, SqlType::Blob | SqlType::Clob | SqlType::Xml)
    }

    /// Whether a column of this type can hold every value a column of
    /// `source` can hold. Used by the reference ordering to pick the
    /// lowest-rank target candidate.
    pub fn accommodates(&self, source: &SqlType) -> bool {
        use SqlType::*;
        match (self, source) {
            (Bool, Bool) => true,
            (Int { bytes: tb, signed: ts }, Bool) => *tb >= 1 && *ts,
            (Int { bytes: tb, signed: ts }, Int { bytes: sb, signed: ss }) => {
                if ts == ss {
                    tb >= sb
                } else if *ts {
                    // signed target needs an extra byte of headroom for an
                    // unsigned source of the same width
                    tb > sb
                } else {
                    false
                }
            }
            (Decimal { precision: tp, scale: tsc }, Int { bytes, .. }) => {
                let needed: u16 = match bytes {
                    1 => 3,
                    2 => 5,
                    3 => 8,
                    4 => 10,
                    _ => 19,
                };
                tp.map_or(true, |p| p >= needed) && tsc.unwrap_or(0) == 0
            }
            (
                Decimal { precision: tp, scale: tsc },
                Decimal { precision: sp, scale: ssc },
            ) => {
                let p_ok = match (tp, sp) {
                    (None, _) => true,
                    (Some(_), None) => false,
                    (Some(t), Some(s)) => t >= s,
                };
                let s_ok = match (tsc, ssc) {
                    (None, _) => true,
                    (Some(_), None) => false,
                    (Some(t), Some(s)) => t >= s,
                };
                p_ok && s_ok
            }
            (Float { bytes: tb }, Float { bytes: sb }) => tb >= sb,
            (Char(tn), Char(sn)) => len_covers(*tn, *sn),
            (VarChar(tn), Char(sn) | VarChar(sn)) => len_covers(*tn, *sn),
            (Text, Char(_) | VarChar(_) | Text) => true,
            (Clob, Char(_) | VarChar(_) | Text | Clob) => true,
            (Binary(tn), Binary(sn)) => len_covers(*tn, *sn),
            (VarBinary(tn), Binary(sn) | VarBinary(sn)) => len_covers(*tn, *sn),
            (Blob, Binary(_) | VarBinary(_) | Blob) => true,
            (Date, Date) => true,
            (Time, Time) => true,
            (Timestamp { tz: tt }, Timestamp { tz: st }) => *tt || !st,
            (Timestamp { .. }, Date) => true,
            (Xml, Xml) => true,
            (Other(t), Other(s)) => t.eq_ignore_ascii_case(s),
            _ => false,
        }
    }

    /// Parse an engine-specific catalog type string.
    ///
    /// Unrecognized spellings fall back to [`SqlType::Other`] with the raw
    /// text preserved, so nothing is lost — merely unreasoned-about.
    pub fn parse(engine: Engine, raw: &str) -> SqlType {
        let norm = raw.trim().to_uppercase();
        let (base, args) = split_args(&norm);
        let unsigned = base.contains("UNSIGNED");
        let base = base.replace(" UNSIGNED", "");
        let base = base.trim();

        match engine {
            Engine::Oracle => parse_oracle(base, &args, &norm),
            Engine::Postgres => parse_postgres(base, &args, &norm),
            Engine::SqlServer => parse_sqlserver(base, &args, &norm),
            Engine::Mysql => parse_mysql(base, &args, unsigned, &norm),
        }
    }
}

fn len_covers(target: Option<u32>, source: Option<u32>) -> bool {
    match (target, source) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(t), Some(s)) => t >= s,
    }
}

/// Split `"NAME(a,b) SUFFIX"` into the name-plus-suffix and numeric args.
/// Non-numeric args ("MAX", "*") come back as `None` entries.
fn split_args(norm: &str) -> (String, Vec<Option<i64>>) {
    let Some(open) = norm.find('(') else {
        return (norm.to_string(), Vec::new());
    };
    let Some(close) = norm.rfind(')') else {
        return (norm.to_string(), Vec::new());
    };
    let mut name = norm[..open].trim().to_string();
    let suffix = norm[close + 1..].trim();
    if !suffix.is_empty() {
        name.push(' ');
        name.push_str(suffix);
    }
    let args = norm[open + 1..close]
        .split(',')
        .map(|a| a.trim().parse::<i64>().ok())
        .collect();
    (name, args)
}

fn int_for_precision(precision: i64) -> SqlType {
    let bytes = match precision {
        0..=4 => 2,
        5..=9 => 4,
        _ => 8,
    };
    SqlType::Int {
        bytes,
        signed: true,
    }
}

fn parse_oracle(base: &str, args: &[Option<i64>], raw: &str) -> SqlType {
    match base {
        "VARCHAR2" | "NVARCHAR2" | "VARCHAR" => SqlType::VarChar(arg_u32(args, 0)),
        "CHAR" | "NCHAR" | "CHARACTER" => SqlType::Char(arg_u32(args, 0)),
        "NUMBER" | "NUMERIC" | "DECIMAL" | "DEC" => match (args.first(), args.get(1)) {
            (Some(Some(p)), Some(Some(0))) | (Some(Some(p)), None) if *p <= 18 => {
                int_for_precision(*p)
            }
            (Some(Some(p)), s) => SqlType::Decimal {
                precision: Some(*p as u16),
                scale: s.copied().flatten().map(|v| v as u16),
            },
            _ => SqlType::Decimal {
                precision: None,
                scale: None,
            },
        },
        "INTEGER" | "INT" => SqlType::Int {
            bytes: 4,
            signed: true,
        },
        "SMALLINT" => SqlType::Int {
            bytes: 2,
            signed: true,
        },
        "BINARY_FLOAT" => SqlType::Float { bytes: 4 },
        "BINARY_DOUBLE" | "FLOAT" | "DOUBLE PRECISION" | "REAL" => SqlType::Float { bytes: 8 },
        // Oracle DATE carries a time-of-day component
        "DATE" => SqlType::Timestamp { tz: false },
        "TIMESTAMP" => SqlType::Timestamp { tz: false },
        "TIMESTAMP WITH TIME ZONE" | "TIMESTAMP WITH LOCAL TIME ZONE" => {
            SqlType::Timestamp { tz: true }
        }
        "RAW" => SqlType::VarBinary(arg_u32(args, 0)),
        "LONG RAW" => SqlType::Blob,
        "LONG" => SqlType::Clob,
        "BLOB" | "BFILE" => SqlType::Blob,
        "CLOB" | "NCLOB" => SqlType::Clob,
        "XMLTYPE" | "SYS.XMLTYPE" => SqlType::Xml,
        _ => SqlType::Other(raw.to_string()),
    }
}

fn parse_postgres(base: &str, args: &[Option<i64>], raw: &str) -> SqlType {
    match base {
        "SMALLINT" | "INT2" | "SMALLSERIAL" => SqlType::Int {
            bytes: 2,
            signed: true,
        },
        "INTEGER" | "INT" | "INT4" | "SERIAL" => SqlType::Int {
            bytes: 4,
            signed: true,
        },
        "BIGINT" | "INT8" | "BIGSERIAL" => SqlType::Int {
            bytes: 8,
            signed: true,
        },
        "NUMERIC" | "DECIMAL" => SqlType::Decimal {
            precision: arg_u16(args, 0),
            scale: arg_u16(args, 1),
        },
        "REAL" | "FLOAT4" => SqlType::Float { bytes: 4 },
        "DOUBLE PRECISION" | "FLOAT8" => SqlType::Float { bytes: 8 },
        "CHARACTER VARYING" | "VARCHAR" => SqlType::VarChar(arg_u32(args, 0)),
        "CHARACTER" | "CHAR" | "BPCHAR" => SqlType::Char(arg_u32(args, 0)),
        "TEXT" => SqlType::Text,
        "BYTEA" => SqlType::Blob,
        "DATE" => SqlType::Date,
        "TIME" | "TIME WITHOUT TIME ZONE" | "TIME WITH TIME ZONE" | "TIMETZ" => SqlType::Time,
        "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => SqlType::Timestamp { tz: false },
        "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" => SqlType::Timestamp { tz: true },
        "BOOLEAN" | "BOOL" => SqlType::Bool,
        "XML" => SqlType::Xml,
        _ => SqlType::Other(raw.to_string()),
    }
}

fn parse_sqlserver(base: &str, args: &[Option<i64>], raw: &str) -> SqlType {
    let max = args.first() == Some(&None) || args.first() == Some(&Some(-1));
    match base {
        "TINYINT" => SqlType::Int {
            bytes: 1,
            signed: false,
        },
        "SMALLINT" => SqlType::Int {
            bytes: 2,
            signed: true,
        },
        "INT" | "INTEGER" => SqlType::Int {
            bytes: 4,
            signed: true,
        },
        "BIGINT" => SqlType::Int {
            bytes: 8,
            signed: true,
        },
        "BIT" => SqlType::Bool,
        "DECIMAL" | "NUMERIC" => SqlType::Decimal {
            precision: arg_u16(args, 0),
            scale: arg_u16(args, 1),
        },
        "MONEY" => SqlType::Decimal {
            precision: Some(19),
            scale: Some(4),
        },
        "SMALLMONEY" => SqlType::Decimal {
            precision: Some(10),
            scale: Some(4),
        },
        "REAL" => SqlType::Float { bytes: 4 },
        "FLOAT" => SqlType::Float { bytes: 8 },
        "CHAR" | "NCHAR" => SqlType::Char(arg_u32(args, 0)),
        // VARCHAR(MAX) and NVARCHAR(MAX) are long varchar, i.e. LOBs
        "VARCHAR" | "NVARCHAR" if max => SqlType::Clob,
        "VARCHAR" | "NVARCHAR" => SqlType::VarChar(arg_u32(args, 0)),
        "TEXT" | "NTEXT" => SqlType::Clob,
        "BINARY" => SqlType::Binary(arg_u32(args, 0)),
        "VARBINARY" if max => SqlType::Blob,
        "VARBINARY" => SqlType::VarBinary(arg_u32(args, 0)),
        "IMAGE" => SqlType::Blob,
        "DATE" => SqlType::Date,
        "TIME" => SqlType::Time,
        "DATETIME" | "DATETIME2" | "SMALLDATETIME" => SqlType::Timestamp { tz: false },
        "DATETIMEOFFSET" => SqlType::Timestamp { tz: true },
        "XML" => SqlType::Xml,
        _ => SqlType::Other(raw.to_string()),
    }
}

fn parse_mysql(base: &str, args: &[Option<i64>], unsigned: bool, raw: &str) -> SqlType {
    let signed = !unsigned;
    match base {
        // tinyint(1) is the conventional boolean
        "TINYINT" if args.first() == Some(&Some(1)) => SqlType::Bool,
        "TINYINT" => SqlType::Int { bytes: 1, signed },
        "SMALLINT" | "YEAR" => SqlType::Int { bytes: 2, signed },
        "MEDIUMINT" => SqlType::Int { bytes: 3, signed },
        "INT" | "INTEGER" => SqlType::Int { bytes: 4, signed },
        "BIGINT" => SqlType::Int { bytes: 8, signed },
        "DECIMAL" | "NUMERIC" => SqlType::Decimal {
            precision: arg_u16(args, 0),
            scale: arg_u16(args, 1),
        },
        "FLOAT" => SqlType::Float { bytes: 4 },
        "DOUBLE" | "DOUBLE PRECISION" | "REAL" => SqlType::Float { bytes: 8 },
        "CHAR" => SqlType::Char(arg_u32(args, 0)),
        "VARCHAR" => SqlType::VarChar(arg_u32(args, 0)),
        "TINYTEXT" | "TEXT" | "MEDIUMTEXT" => SqlType::Text,
        "LONGTEXT" => SqlType::Clob,
        "BINARY" => SqlType::Binary(arg_u32(args, 0)),
        "VARBINARY" => SqlType::VarBinary(arg_u32(args, 0)),
        "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => SqlType::Blob,
        "DATE" => SqlType::Date,
        "TIME" => SqlType::Time,
        "DATETIME" => SqlType::Timestamp { tz: false },
        // MySQL TIMESTAMP is stored UTC-normalized
        "TIMESTAMP" => SqlType::Timestamp { tz: true },
        "BOOL" | "BOOLEAN" => SqlType::Bool,
        _ => SqlType::Other(raw.to_string()),
    }
}

fn arg_u32(args: &[Option<i64>], idx: usize) -> Option<u32> {
    args.get(idx).copied().flatten().and_then(|v| v.try_into().ok())
}

fn arg_u16(args: &[Option<i64>], idx: usize) -> Option<u16> {
    args.get(idx).copied().flatten().and_then(|v| v.try_into().ok())
}

/// Generic ANSI-ish spelling, used in reports and as the neutral rendering
/// an adapter falls back to.
impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SqlType::*;
        match self {
            Bool => f.write_str("BOOLEAN"),
            Int { bytes, signed } => {
                let name = match bytes {
                    1 => "TINYINT",
                    2 => "SMALLINT",
                    3 => "MEDIUMINT",
                    4 => "INTEGER",
                    _ => "BIGINT",
                };
                if *signed {
                    f.write_str(name)
                } else {
                    write!(f, "{name} UNSIGNED")
                }
            }
            Decimal {
                precision: Some(p),
                scale: Some(s),
            } => write!(f, "NUMERIC({p},{s})"),
            Decimal {
                precision: Some(p),
                scale: None,
            } => write!(f, "NUMERIC({p})"),
            Decimal { .. } => f.write_str("NUMERIC"),
            Float { bytes: 4 } => f.write_str("REAL"),
            Float { .. } => f.write_str("DOUBLE PRECISION"),
            Char(Some(n)) => write!(f, "CHAR({n})"),
            Char(None) => f.write_str("CHAR"),
            VarChar(Some(n)) => write!(f, "VARCHAR({n})"),
            VarChar(None) => f.write_str("VARCHAR"),
            Text => f.write_str("TEXT"),
            Binary(Some(n)) => write!(f, "BINARY({n})"),
            Binary(None) => f.write_str("BINARY"),
            VarBinary(Some(n)) => write!(f, "VARBINARY({n})"),
            VarBinary(None) => f.write_str("VARBINARY"),
            Blob => f.write_str("BLOB"),
            Clob => f.write_str("CLOB"),
            Date => f.write_str("DATE"),
            Time => f.write_str("TIME"),
            Timestamp { tz: true } => f.write_str("TIMESTAMP WITH TIME ZONE"),
            Timestamp { tz: false } => f.write_str("TIMESTAMP"),
            Xml => f.write_str("XML"),
            Other(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_varchar2_parses_with_length() {
        assert_eq!(
            SqlType::parse(Engine::Oracle, "VARCHAR2(100)"),
            SqlType::VarChar(Some(100))
        );
    }

    #[test]
    fn oracle_number_scale_zero_becomes_int() {
        assert_eq!(
            SqlType::parse(Engine::Oracle, "NUMBER(9,0)"),
            SqlType::Int {
                bytes: 4,
                signed: true
            }
        );
        assert_eq!(
            SqlType::parse(Engine::Oracle, "NUMBER(18)"),
            SqlType::Int {
                bytes: 8,
                signed: true
            }
        );
    }

    #[test]
    fn oracle_bare_number_is_unbounded_decimal() {
        assert_eq!(
            SqlType::parse(Engine::Oracle, "NUMBER"),
            SqlType::Decimal {
                precision: None,
                scale: None
            }
        );
    }

    #[test]
    fn oracle_lob_family() {
        assert_eq!(SqlType::parse(Engine::Oracle, "BLOB"), SqlType::Blob);
        assert_eq!(SqlType::parse(Engine::Oracle, "NCLOB"), SqlType::Clob);
        assert_eq!(SqlType::parse(Engine::Oracle, "LONG RAW"), SqlType::Blob);
        assert_eq!(
            SqlType::parse(Engine::Oracle, "RAW(2000)"),
            SqlType::VarBinary(Some(2000))
        );
        assert!(SqlType::parse(Engine::Oracle, "BLOB").is_lob());
        assert!(!SqlType::parse(Engine::Oracle, "RAW(16)").is_lob());
    }

    #[test]
    fn oracle_timestamp_with_time_zone() {
        assert_eq!(
            SqlType::parse(Engine::Oracle, "TIMESTAMP(6) WITH TIME ZONE"),
            SqlType::Timestamp { tz: true }
        );
        // Oracle DATE has a time component
        assert_eq!(
            SqlType::parse(Engine::Oracle, "DATE"),
            SqlType::Timestamp { tz: false }
        );
    }

    #[test]
    fn postgres_character_varying() {
        assert_eq!(
            SqlType::parse(Engine::Postgres, "character varying(64)"),
            SqlType::VarChar(Some(64))
        );
        assert_eq!(SqlType::parse(Engine::Postgres, "bytea"), SqlType::Blob);
        assert_eq!(
            SqlType::parse(Engine::Postgres, "timestamp with time zone"),
            SqlType::Timestamp { tz: true }
        );
    }

    #[test]
    fn sqlserver_max_types_are_lobs() {
        assert_eq!(SqlType::parse(Engine::SqlServer, "VARCHAR(MAX)"), SqlType::Clob);
        assert_eq!(
            SqlType::parse(Engine::SqlServer, "VARBINARY(MAX)"),
            SqlType::Blob
        );
        assert_eq!(SqlType::parse(Engine::SqlServer, "IMAGE"), SqlType::Blob);
        assert_eq!(
            SqlType::parse(Engine::SqlServer, "NVARCHAR(200)"),
            SqlType::VarChar(Some(200))
        );
    }

    #[test]
    fn sqlserver_tinyint_is_unsigned() {
        assert_eq!(
            SqlType::parse(Engine::SqlServer, "tinyint"),
            SqlType::Int {
                bytes: 1,
                signed: false
            }
        );
    }

    #[test]
    fn mysql_unsigned_and_bool() {
        assert_eq!(
            SqlType::parse(Engine::Mysql, "INT UNSIGNED"),
            SqlType::Int {
                bytes: 4,
                signed: false
            }
        );
        assert_eq!(SqlType::parse(Engine::Mysql, "tinyint(1)"), SqlType::Bool);
        assert_eq!(SqlType::parse(Engine::Mysql, "LONGBLOB"), SqlType::Blob);
    }

    #[test]
    fn unknown_type_preserved_as_other() {
        assert_eq!(
            SqlType::parse(Engine::Postgres, "uuid"),
            SqlType::Other("UUID".into())
        );
    }

    #[test]
    fn int_accommodation_widths_and_signs() {
        let i4 = SqlType::Int {
            bytes: 4,
            signed: true,
        };
        let i8s = SqlType::Int {
            bytes: 8,
            signed: true,
        };
        let u4 = SqlType::Int {
            bytes: 4,
            signed: false,
        };
        assert!(i8s.accommodates(&i4));
        assert!(!i4.accommodates(&i8s));
        // signed 8-byte holds unsigned 4-byte, signed 4-byte does not
        assert!(i8s.accommodates(&u4));
        assert!(!i4.accommodates(&u4));
        // unsigned never holds signed
        assert!(!u4.accommodates(&i4));
    }

    #[test]
    fn decimal_accommodates_ints_and_smaller_decimals() {
        let d20 = SqlType::Decimal {
            precision: Some(20),
            scale: Some(0),
        };
        assert!(d20.accommodates(&SqlType::Int {
            bytes: 8,
            signed: true
        }));
        let d9_2 = SqlType::Decimal {
            precision: Some(9),
            scale: Some(2),
        };
        let d12_4 = SqlType::Decimal {
            precision: Some(12),
            scale: Some(4),
        };
        assert!(d12_4.accommodates(&d9_2));
        assert!(!d9_2.accommodates(&d12_4));
    }

    #[test]
    fn string_family_widening() {
        let c10 = SqlType::Char(Some(10));
        let v10 = SqlType::VarChar(Some(10));
        let v20 = SqlType::VarChar(Some(20));
        assert!(v20.accommodates(&v10));
        assert!(v10.accommodates(&c10));
        assert!(SqlType::Text.accommodates(&v20));
        assert!(SqlType::Clob.accommodates(&SqlType::Text));
        assert!(!v10.accommodates(&v20));
    }

    #[test]
    fn timestamp_accommodation() {
        let ts = SqlType::Timestamp { tz: false };
        let tstz = SqlType::Timestamp { tz: true };
        assert!(tstz.accommodates(&ts));
        assert!(!ts.accommodates(&tstz));
        assert!(ts.accommodates(&SqlType::Date));
    }

    #[test]
    fn display_spellings() {
        assert_eq!(SqlType::VarChar(Some(100)).to_string(), "VARCHAR(100)");
        assert_eq!(
            SqlType::Decimal {
                precision: Some(20),
                scale: None
            }
            .to_string(),
            "NUMERIC(20)"
        );
        assert_eq!(SqlType::Timestamp { tz: true }.to_string(), "TIMESTAMP WITH TIME ZONE");
    }
}
