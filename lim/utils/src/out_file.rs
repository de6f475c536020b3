use crate::LimResult;
use std::{
    fmt,
    io::{self, BufWriter},
    path::PathBuf,
    str::FromStr,
};

/// Where the compiler writes the printed design. Used by the `-o` option.
/// * "-" and "<out>" are treated as stdout.
/// * "<err>" is treated as stderr.
/// * "<null>" discards the output.
/// * All other strings are treated as file paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputFile {
    Null,
    #[default]
    Stdout,
    Stderr,
    File(PathBuf),
}

impl FromStr for OutputFile {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err("empty output path".to_string()),
            "-" | "<out>" => Ok(OutputFile::Stdout),
            "<err>" => Ok(OutputFile::Stderr),
            "<null>" => Ok(OutputFile::Null),
            _ => Ok(OutputFile::File(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFile::Stdout => write!(f, "-"),
            OutputFile::Stderr => write!(f, "<err>"),
            OutputFile::Null => write!(f, "<null>"),
            OutputFile::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl OutputFile {
    /// Open the stream. A file is created or truncated.
    pub fn get_write(&self) -> LimResult<Box<dyn io::Write>> {
        Ok(match self {
            OutputFile::Stdout => Box::new(BufWriter::new(io::stdout())),
            OutputFile::Stderr => Box::new(BufWriter::new(io::stderr())),
            OutputFile::File(path) => {
                Box::new(BufWriter::new(std::fs::File::create(path)?))
            }
            OutputFile::Null => Box::new(io::sink()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::OutputFile;
    use std::path::PathBuf;

    #[test]
    fn parses_stream_names() {
        assert_eq!("-".parse(), Ok(OutputFile::Stdout));
        assert_eq!("<err>".parse(), Ok(OutputFile::Stderr));
        assert_eq!("<null>".parse(), Ok(OutputFile::Null));
        assert_eq!(
            "out.lim".parse(),
            Ok(OutputFile::File(PathBuf::from("out.lim")))
        );
        assert!("".parse::<OutputFile>().is_err());
        assert_eq!(OutputFile::Null.to_string(), "<null>");
    }
}
