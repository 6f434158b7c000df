use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::Path,
};

use anyhow::Context;

/// Writes `value` as pretty JSON to `output_path`, or to stdout when no path is given.
pub(crate) fn save_json<T>(value: &T, output_path: Option<&Path>) -> anyhow::Result<()>
where
    T: serde::Serialize,
{
    match output_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_json(BufWriter::new(file), value, path)
        }
        None => write_json(io::stdout().lock(), value, Path::new("stdout")),
    }
}

fn write_json<W, T>(mut writer: W, value: &T, target: &Path) -> anyhow::Result<()>
where
    W: io::Write,
    T: serde::Serialize,
{
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write JSON to {}", target.display()))?;
    writeln!(writer)
        .and_then(|()| writer.flush())
        .with_context(|| format!("Failed to flush output to {}", target.display()))?;
    Ok(())
}

pub(crate) fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {} JSON file: {}", file_kind, path.display()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_save_and_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.json");
        let value = BTreeMap::from([("a".to_owned(), 1), ("b".to_owned(), 2)]);

        save_json(&value, Some(&path)).unwrap();
        let read: BTreeMap<String, i32> = read_json_file("test", &path).unwrap();

        assert_eq!(read, value);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_json_file::<u32, _>("model", dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().starts_with("Failed to open model file"));
    }
}
