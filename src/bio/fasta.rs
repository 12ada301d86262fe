use crate::bio::sequence::Sequence;
use crate::{Result, VirosampleError};
use flate2::read::GzDecoder;
use nom::{
    bytes::complete::{tag, take_till},
    character::complete::line_ending,
    combinator::opt,
    IResult,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Strain name from a FASTA header: text before the first `|`, spaces as `_`.
pub fn normalize_strain_name(header: &str) -> String {
    let name = header.split('|').next().unwrap_or("").trim();
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Parse a FASTA header line, returning the raw text after `>`.
fn parse_header(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, _) = tag(b">")(input)?;
    let (input, header) = take_till(|c: u8| c == b'\n' || c == b'\r')(input)?;
    let (input, _) = opt(line_ending)(input)?;
    Ok((input, header))
}

/// Parse sequence lines until next header or EOF
fn parse_sequence(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let mut sequence = Vec::new();
    let mut remaining = input;

    while !remaining.is_empty() && remaining[0] != b'>' {
        let (rest, line) =
            take_till::<_, _, nom::error::Error<_>>(|c: u8| c == b'\n' || c == b'\r')(remaining)?;
        let (rest, _) = opt(line_ending)(rest)?;
        // A lone '\r' is not a line ending for nom; skip it so the loop advances.
        let rest = if rest.len() == remaining.len() - line.len() && rest.first() == Some(&b'\r') {
            &rest[1..]
        } else {
            rest
        };

        sequence.extend(line.iter().copied().filter(|c| !c.is_ascii_whitespace()));
        remaining = rest;
    }

    Ok((remaining, sequence))
}

fn parse_record(input: &[u8]) -> IResult<&[u8], Sequence> {
    let (input, header) = parse_header(input)?;
    let (input, sequence) = parse_sequence(input)?;

    let header = String::from_utf8_lossy(header);
    let mut seq = Sequence::new(normalize_strain_name(&header), sequence);
    if let Some((_, rest)) = header.split_once('|') {
        if !rest.trim().is_empty() {
            seq = seq.with_description(rest.trim().to_string());
        }
    }

    Ok((input, seq))
}

/// Parse FASTA from bytes
pub fn parse_fasta_from_bytes(data: &[u8]) -> Result<Vec<Sequence>> {
    let mut sequences = Vec::new();
    let mut input = data;

    loop {
        while !input.is_empty() && input[0].is_ascii_whitespace() {
            input = &input[1..];
        }
        if input.is_empty() {
            break;
        }
        if input[0] != b'>' {
            return Err(VirosampleError::Parse(format!(
                "Expected '>' at start of FASTA record, found '{}'",
                input[0] as char
            )));
        }

        let (rest, seq) = parse_record(input)
            .map_err(|e| VirosampleError::Parse(format!("Failed to parse FASTA: {:?}", e)))?;
        if seq.id.is_empty() {
            return Err(VirosampleError::Parse(
                "FASTA record with an empty name".to_string(),
            ));
        }
        sequences.push(seq);
        input = rest;
    }

    Ok(sequences)
}

/// Parse a FASTA file into sequences (supports .gz compression)
pub fn parse_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<Sequence>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut buffer = Vec::new();

    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        GzDecoder::new(BufReader::new(file)).read_to_end(&mut buffer)?;
    } else {
        BufReader::new(file).read_to_end(&mut buffer)?;
    }

    parse_fasta_from_bytes(&buffer)
}

/// Write sequences to a FASTA file (supports .gz compression)
pub fn write_fasta<P: AsRef<Path>>(path: P, sequences: &[Sequence]) -> Result<()> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let path = path.as_ref();
    let file = File::create(path)?;

    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = BufWriter::new(encoder);
        write_fasta_to_writer(&mut writer, sequences)?;
        writer.flush()?;
    } else {
        let mut writer = BufWriter::new(file);
        write_fasta_to_writer(&mut writer, sequences)?;
        writer.flush()?;
    }

    Ok(())
}

/// One header line and one sequence line per record.
pub fn write_fasta_to_writer<W: Write>(writer: &mut W, sequences: &[Sequence]) -> Result<()> {
    for seq in sequences {
        writeln!(writer, ">{}", seq.id)?;
        writer.write_all(&seq.sequence)?;
        writeln!(writer)?;
    }
    Ok(())
}
