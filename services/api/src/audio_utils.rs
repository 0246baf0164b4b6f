use base64::Engine;

/// Decodes a base64 string representing PCM16 audio into a vector of f32 samples.
/// The function converts the string to a binary vector of u8, interprets chunks as i16 values,
/// and then normalizes them to f32 values between -1.0 and 1.0.
pub fn decode_f32_from_base64_i16(base64_fragment: &str) -> Vec<f32> {
    if let Ok(pcm16_bytes) = base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        pcm16_bytes
            .chunks_exact(2)
            .map(|chunk| {
                let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                (v as f32 / 32768.0).clamp(-1.0, 1.0)
            })
            .collect()
    } else {
        tracing::error!("Failed to decode base64 audio fragment");
        Vec::new()
    }
}

/// Encodes little-endian PCM16 bytes from the browser microphone for the realtime API.
/// A trailing odd byte is dropped.
pub fn encode_pcm16_bytes(bytes: &[u8]) -> String {
    let even = bytes.len() - bytes.len() % 2;
    base64::engine::general_purpose::STANDARD.encode(&bytes[..even])
}
