use crate::error::{Error, Result};
use crate::pprofpb::Profile;
use flate2::read::GzDecoder;
use prost::Message;
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decodes a pprof document, gunzipping it first if it carries the gzip
/// magic bytes.
pub fn decode_pprof(raw: &[u8]) -> Result<Profile> {
    let decompressed;
    let bytes = if raw.starts_with(&GZIP_MAGIC) {
        let mut buf = Vec::with_capacity(raw.len() * 4);
        GzDecoder::new(raw)
            .read_to_end(&mut buf)
            .map_err(|e| Error::invalid_argument(format!("Failed to decompress gzip: {}", e)))?;
        decompressed = buf;
        decompressed.as_slice()
    } else {
        raw
    };

    Profile::decode(bytes)
        .map_err(|e| Error::invalid_argument(format!("Failed to decode profile: {}", e)))
}

/// Encodes and gzips a pprof document.
pub fn encode_pprof(profile: &Profile) -> Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&profile.encode_to_vec())
        .map_err(|e| Error::internal(format!("Failed to compress profile: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::internal(format!("Failed to compress profile: {}", e)))
}
