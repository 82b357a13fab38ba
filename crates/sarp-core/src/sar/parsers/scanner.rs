use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use rayon::iter::Either;
use std::fs::OpenOptions;
use std::path::Path;
use std::str::from_utf8;

pub type Error = Box<dyn std::error::Error + 'static>;

#[derive(Clone, Debug)]
struct Bytes<F>(pub F)
where
    F: FnMut(u64, &[u8]) -> Result<bool, Error>;

impl<F> Sink for Bytes<F>
where
    F: FnMut(u64, &[u8]) -> Result<bool, Error>,
{
    type Error = Error;

    fn matched(&mut self, _searcher: &Searcher, mat: &SinkMatch<'_>) -> Result<bool, Error> {
        let bytes_offset = mat.absolute_byte_offset();
        (self.0)(bytes_offset, mat.bytes())
    }
}

/// Collect every line matching `pattern`, with its byte offset, from a file or
/// an in-memory slice. Used to locate the OS banner and `LINUX RESTART` markers
/// without walking the whole file line by line.
pub fn get_marker_lines(
    path: Either<impl AsRef<Path>, &[u8]>,
    pattern: &str,
) -> Result<Vec<(usize, String)>, Error> {
    let mut markers: Vec<(usize, String)> = vec![];

    {
        let sink = Bytes(|offset, line: &[u8]| {
            markers.push((offset as usize, from_utf8(line)?.trim_end().to_owned()));
            Ok(true)
        });
        match path {
            Either::Left(v) => {
                let file = OpenOptions::new().read(true).open(v)?;
                Searcher::new().search_file(RegexMatcher::new(pattern)?, &file, sink)?;
            }
            Either::Right(v) => {
                Searcher::new().search_slice(RegexMatcher::new(pattern)?, v, sink)?;
            }
        };
    }

    Ok(markers)
}

/// First line containing the `Linux` kernel banner, if any.
pub fn find_banner(content: &[u8]) -> Option<String> {
    get_marker_lines(Either::<&Path, &[u8]>::Right(content), r"Linux")
        .ok()
        .and_then(|mut v| {
            if v.is_empty() {
                None
            } else {
                Some(v.remove(0).1)
            }
        })
}
