//! Shared helpers for integration tests: a small PDF writer that records
//! real byte offsets so cross-reference data always points where it should.

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::Write;

/// Route library logging to the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Zlib-compress `data` for `/FlateDecode` streams.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Incremental PDF writer.
///
/// Objects written since the last cross-reference section are listed in the
/// next one, so calling [`PdfBuilder::xref_table`] twice produces an
/// incremental update.
pub struct PdfBuilder {
    buf: Vec<u8>,
    pending: BTreeMap<u32, (u64, u16)>,
    sections: usize,
    last_xref: Option<u64>,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        let mut buf = format!("%PDF-{}\n", version).into_bytes();
        buf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            pending: BTreeMap::new(),
            sections: 0,
            last_xref: None,
        }
    }

    pub fn offset(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Offset of the most recent cross-reference section.
    pub fn last_xref(&self) -> Option<u64> {
        self.last_xref
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn object(&mut self, id: u32, body: &str) -> u64 {
        self.object_with_gen(id, 0, body)
    }

    pub fn object_with_gen(&mut self, id: u32, gen: u16, body: &str) -> u64 {
        let offset = self.offset();
        self.pending.insert(id, (offset, gen));
        self.buf
            .extend_from_slice(format!("{} {} obj\n{}\nendobj\n", id, gen, body).as_bytes());
        offset
    }

    /// Write a stream object; `/Length` is appended to `dict_entries`.
    pub fn stream(&mut self, id: u32, dict_entries: &str, data: &[u8]) -> u64 {
        let offset = self.offset();
        self.pending.insert(id, (offset, 0));
        self.buf.extend_from_slice(
            format!("{} 0 obj\n<< {} /Length {} >>\nstream\n", id, dict_entries, data.len()).as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        offset
    }

    /// Write an object stream holding `members`, compressed when `flate`.
    ///
    /// Returns `(object number, container, index)` triples for
    /// [`PdfBuilder::xref_stream`].
    pub fn object_stream(&mut self, id: u32, members: &[(u32, &str)], flate: bool) -> Vec<(u32, u32, u32)> {
        let mut header = String::new();
        let mut body = String::new();
        for (number, text) in members {
            header.push_str(&format!("{} {} ", number, body.len()));
            body.push_str(text);
            body.push('\n');
        }
        let first = header.len();
        let mut data = header.into_bytes();
        data.extend_from_slice(body.as_bytes());

        let mut dict = format!("/Type /ObjStm /N {} /First {}", members.len(), first);
        let data = if flate {
            dict.push_str(" /Filter /FlateDecode");
            deflate(&data)
        } else {
            data
        };
        self.stream(id, &dict, &data);

        members
            .iter()
            .enumerate()
            .map(|(index, (number, _))| (*number, id, index as u32))
            .collect()
    }

    /// Write a classic `xref` table for the pending objects, the trailer
    /// (`trailer_entries` go inside `<< >>`), `startxref` and `%%EOF`.
    pub fn xref_table(&mut self, trailer_entries: &str) -> u64 {
        let offset = self.offset();
        let mut entries: BTreeMap<u32, String> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(id, (off, gen))| (id, format!("{:010} {:05} n \n", off, gen)))
            .collect();
        if self.sections == 0 {
            entries.insert(0, "0000000000 65535 f \n".to_string());
        }

        let mut out = String::from("xref\n");
        for run in contiguous_runs(entries.keys().copied()) {
            out.push_str(&format!("{} {}\n", run.0, run.1));
            for id in run.0..run.0 + run.1 {
                out.push_str(&entries[&id]);
            }
        }
        out.push_str(&format!("trailer\n<< {} >>\nstartxref\n{}\n%%EOF\n", trailer_entries, offset));
        self.buf.extend_from_slice(out.as_bytes());
        self.sections += 1;
        self.last_xref = Some(offset);
        offset
    }

    /// Write a cross-reference stream as object `id` covering the pending
    /// objects plus `compressed` members, then `startxref` and `%%EOF`.
    pub fn xref_stream(&mut self, id: u32, extra_entries: &str, compressed: &[(u32, u32, u32)]) -> u64 {
        let offset = self.offset();
        let mut records: BTreeMap<u32, [u8; 7]> = BTreeMap::new();
        for (number, (off, gen)) in std::mem::take(&mut self.pending) {
            records.insert(number, record(1, off as u32, gen));
        }
        for &(number, container, index) in compressed {
            records.insert(number, record(2, container, index as u16));
        }
        records.insert(id, record(1, offset as u32, 0));
        if self.sections == 0 {
            records.insert(0, record(0, 0, 65535));
        }

        let size = records.keys().max().map_or(1, |max| max + 1);
        let mut index = String::new();
        let mut data = Vec::new();
        for (start, count) in contiguous_runs(records.keys().copied()) {
            index.push_str(&format!("{} {} ", start, count));
            for number in start..start + count {
                data.extend_from_slice(&records[&number]);
            }
        }

        self.buf.extend_from_slice(
            format!(
                "{} 0 obj\n<< /Type /XRef /Size {} /W [1 4 2] /Index [{}] {} /Length {} >>\nstream\n",
                id,
                size,
                index.trim_end(),
                extra_entries,
                data.len()
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(&data);
        self.buf
            .extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", offset).as_bytes());
        self.sections += 1;
        self.last_xref = Some(offset);
        offset
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

fn record(kind: u8, second: u32, third: u16) -> [u8; 7] {
    let mut out = [0u8; 7];
    out[0] = kind;
    out[1..5].copy_from_slice(&second.to_be_bytes());
    out[5..7].copy_from_slice(&third.to_be_bytes());
    out
}

/// `(start, count)` runs of consecutive numbers from a sorted sequence.
fn contiguous_runs(numbers: impl Iterator<Item = u32>) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for n in numbers {
        match runs.last_mut() {
            Some((start, count)) if *start + *count == n => *count += 1,
            _ => runs.push((n, 1)),
        }
    }
    runs
}

/// Standard font with fixed 500-unit widths for codes 32..=126.
pub fn helvetica_dict() -> String {
    let widths = vec!["500"; 95].join(" ");
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /FirstChar 32 /LastChar 126 /Widths [{}] >>",
        widths
    )
}

/// One-page document: catalog 1, pages 2, page 3, content 4, font 5.
pub fn single_page_pdf(content: &[u8]) -> Vec<u8> {
    let mut pdf = PdfBuilder::new("1.4");
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(
        3,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>",
    );
    pdf.stream(4, "", content);
    pdf.object(5, &helvetica_dict());
    pdf.xref_table("/Size 6 /Root 1 0 R");
    pdf.finish()
}
