// src/codec.rs
//
// Delimited record codec for the UNLOAD dump and the transformed output.
// Input rows are `id<d>full_name` with no header; an escape byte makes the
// next byte literal (delimiter, newline or the escape itself). Output rows are
// the eight enriched columns, unquoted, newline terminated.

use async_stream::stream;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use futures::Stream;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};

use crate::error::{EtlError, Result};
use crate::job_client::JobId;
use crate::name_decomposer::NameDecomposition;

/// Number of columns in every input row.
pub const INPUT_FIELDS: usize = 2;

/// One input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: String,
    pub full_name: String,
}

/// One output row, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord {
    pub query_job_id: JobId,
    pub source_id: String,
    pub full_name: String,
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub suffix: Option<String>,
}

impl EnrichedRecord {
    pub fn new(query_job_id: JobId, raw: RawRecord, name: NameDecomposition) -> Self {
        Self {
            query_job_id,
            source_id: raw.id,
            full_name: raw.full_name,
            title: name.prefix,
            first_name: name.first,
            middle_name: name.middle,
            last_name: name.last,
            suffix: name.suffix,
        }
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut csv::Writer<W>, delimiter: u8) -> csv::Result<()> {
        let job = self.query_job_id.to_string();
        let part = |p: &Option<String>| column(p.as_deref().unwrap_or(""), delimiter);
        writer.write_record([
            job,
            column(&self.source_id, delimiter),
            column(&self.full_name, delimiter),
            part(&self.title),
            part(&self.first_name),
            part(&self.middle_name),
            part(&self.last_name),
            part(&self.suffix),
        ])
    }
}

/// Output columns are unquoted: a delimiter or line break inside a value
/// becomes a space, as the UNLOAD does for the name column.
fn column(value: &str, delimiter: u8) -> String {
    let delimiter = char::from(delimiter);
    value
        .chars()
        .map(|c| if c == delimiter || c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Split one logical line into fields. `None` means the line ends in a
/// dangling escape and the record continues on the next line.
fn split_fields(line: &[u8], delimiter: u8, escape: u8) -> Option<Vec<Vec<u8>>> {
    let mut fields = Vec::with_capacity(INPUT_FIELDS);
    let mut field = Vec::new();
    let mut bytes = line.iter().copied();
    while let Some(b) = bytes.next() {
        if b == escape {
            field.push(bytes.next()?);
        } else if b == delimiter {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(b);
        }
    }
    fields.push(field);
    Some(fields)
}

fn raw_record(fields: Vec<Vec<u8>>, uri: &str, record: u64) -> Result<RawRecord> {
    if fields.len() != INPUT_FIELDS {
        return Err(EtlError::decode(
            uri,
            record,
            format!("expected {INPUT_FIELDS} fields, found {}", fields.len()),
        ));
    }
    let mut fields = fields.into_iter().map(String::from_utf8);
    match (fields.next(), fields.next()) {
        (Some(Ok(id)), Some(Ok(full_name))) => Ok(RawRecord { id, full_name }),
        _ => Err(EtlError::decode(uri, record, "field is not valid UTF-8")),
    }
}

/// Lazily decode `reader` into records.
///
/// Malformed rows come out as `Err(EtlError::Decode)` and decoding carries on
/// with the next row. A read failure comes out as `Err(EtlError::Transport)`
/// and ends the stream. Blank lines are not records.
pub fn decode<R>(
    reader: R,
    uri: impl Into<String>,
    delimiter: u8,
    escape: u8,
) -> impl Stream<Item = Result<RawRecord>> + Send
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let uri = uri.into();
    stream! {
        let mut frames = FramedRead::new(reader, AnyDelimiterCodec::new(vec![b'\n'], vec![b'\n']));
        let mut pending: Vec<u8> = Vec::new();
        let mut record: u64 = 0;

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    yield Err(EtlError::transport(format!("read {uri}"), e));
                    return;
                }
            };
            pending.extend_from_slice(&frame);
            if pending.is_empty() {
                continue;
            }
            let Some(fields) = split_fields(&pending, delimiter, escape) else {
                // Escaped newline: keep the escape so it applies to the newline.
                pending.push(b'\n');
                continue;
            };
            pending.clear();
            record += 1;
            yield raw_record(fields, &uri, record);
        }

        if !pending.is_empty() {
            record += 1;
            yield Err(EtlError::decode(&uri, record, "stream ends inside an escape sequence"));
        }
    }
}

/// Serialize records as unquoted, headerless rows.
pub fn encode(records: &[EnrichedRecord], delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for record in records {
        record
            .write_to(&mut writer, delimiter)
            .map_err(|e| EtlError::transport("encode records", e))?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::transport("encode records", anyhow::anyhow!("{e}")))
}
