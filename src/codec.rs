use std::fmt::Write as _;

use chrono::NaiveDateTime;

use crate::domain::{IdentifierTuple, WaveformFormat};
use crate::error::PipelineError;
use crate::waveform::{Stream, Trace};

const SLIST_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const SLIST_VALUES_PER_LINE: usize = 6;

/// Reads and writes waveform files. Implementations must be stateless.
pub trait WaveformCodec: Send + Sync {
    fn extension(&self) -> &'static str;
    fn encode(&self, stream: &Stream) -> Result<Vec<u8>, PipelineError>;
    fn decode(&self, bytes: &[u8]) -> Result<Stream, PipelineError>;
}

impl WaveformFormat {
    pub fn codec(self) -> Box<dyn WaveformCodec> {
        match self {
            WaveformFormat::Json => Box::new(JsonCodec),
            WaveformFormat::Slist => Box::new(SlistCodec),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl WaveformCodec for JsonCodec {
    fn extension(&self) -> &'static str {
        WaveformFormat::Json.extension()
    }

    fn encode(&self, stream: &Stream) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec(stream).map_err(|err| PipelineError::Codec(err.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Stream, PipelineError> {
        let stream: Stream =
            serde_json::from_slice(bytes).map_err(|err| PipelineError::Codec(err.to_string()))?;
        stream.validate()?;
        Ok(stream)
    }
}

/// Plain-text sample list: one `TIMESERIES` header per trace followed by its values.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlistCodec;

impl WaveformCodec for SlistCodec {
    fn extension(&self) -> &'static str {
        WaveformFormat::Slist.extension()
    }

    fn encode(&self, stream: &Stream) -> Result<Vec<u8>, PipelineError> {
        let mut out = String::new();
        for trace in stream.traces() {
            let id = &trace.id;
            // writing into a String cannot fail
            let _ = writeln!(
                out,
                "TIMESERIES {}_{}_{}_{}_D, {} samples, {} sps, {}, SLIST, FLOAT, Counts",
                id.network,
                id.station,
                id.location,
                id.channel,
                trace.samples.len(),
                trace.sampling_rate,
                trace.start.format(SLIST_TIME_FORMAT)
            );
            for line in trace.samples.chunks(SLIST_VALUES_PER_LINE) {
                let values = line.iter().map(f64::to_string).collect::<Vec<_>>();
                let _ = writeln!(out, "{}", values.join("\t"));
            }
        }
        Ok(out.into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Stream, PipelineError> {
        let text =
            std::str::from_utf8(bytes).map_err(|err| PipelineError::Codec(err.to_string()))?;
        let mut stream = Stream::new();
        let mut current: Option<(Trace, usize)> = None;

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix("TIMESERIES ") {
                if let Some((trace, expected)) = current.take() {
                    stream.push(finish_trace(trace, expected)?);
                }
                current = Some(parse_header(header)?);
                continue;
            }
            let Some((trace, _)) = current.as_mut() else {
                return Err(PipelineError::Codec(format!(
                    "line {}: samples before any TIMESERIES header",
                    number + 1
                )));
            };
            for value in line.split_whitespace() {
                let sample = value.parse::<f64>().map_err(|_| {
                    PipelineError::Codec(format!("line {}: bad sample {value}", number + 1))
                })?;
                trace.samples.push(sample);
            }
        }
        if let Some((trace, expected)) = current {
            stream.push(finish_trace(trace, expected)?);
        }

        stream.validate()?;
        Ok(stream)
    }
}

fn parse_header(header: &str) -> Result<(Trace, usize), PipelineError> {
    let bad = || PipelineError::Codec(format!("malformed TIMESERIES header: {header}"));
    let fields = header.split(',').map(str::trim).collect::<Vec<_>>();
    let [name, count, rate, start, ..] = fields.as_slice() else {
        return Err(bad());
    };

    let codes = name.split('_').collect::<Vec<_>>();
    let [network, station, location, channel, _quality] = codes.as_slice() else {
        return Err(bad());
    };
    let id = IdentifierTuple::new(network, station, location, channel)?;

    let expected = count
        .strip_suffix(" samples")
        .and_then(|value| value.parse::<usize>().ok())
        .ok_or_else(bad)?;
    let sampling_rate = rate
        .strip_suffix(" sps")
        .and_then(|value| value.parse::<f64>().ok())
        .ok_or_else(bad)?;
    let start = NaiveDateTime::parse_from_str(start, SLIST_TIME_FORMAT)
        .map_err(|_| bad())?
        .and_utc();

    let trace = Trace::new(id, start, sampling_rate, Vec::with_capacity(expected));
    Ok((trace, expected))
}

fn finish_trace(trace: Trace, expected: usize) -> Result<Trace, PipelineError> {
    if trace.samples.len() != expected {
        return Err(PipelineError::Codec(format!(
            "{}: header announces {expected} samples, found {}",
            trace.id,
            trace.samples.len()
        )));
    }
    Ok(trace)
}
