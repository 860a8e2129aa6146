//! Audio-sink abstraction.
//!
//! Decoding ADTS-framed AAC and writing PCM to a sound card is an opaque
//! external collaborator — this module only captures the
//! interface contract and the OSS device-configuration sequence, not a full
//! AAC decoder.

use std::fmt;

use crate::error::SinkError;

/// Consumes a contiguous ADTS-framed AAC byte buffer and plays it.
///
/// Implementations own their own device lifecycle: open on
/// [`AudioSink::decode_and_play`] entry, close on every exit path (including
/// error), matching the scoped-acquisition resource rule described in the
/// module docs.
pub trait AudioSink: fmt::Debug + Send + Sync {
    fn decode_and_play(&self, adts_aac: &[u8]) -> Result<(), SinkError>;
}

/// A sink that logs and does nothing, for hosts with no audio device and
/// for tests that exercise the control-server protocol without real
/// playback.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn decode_and_play(&self, adts_aac: &[u8]) -> Result<(), SinkError> {
        log::info!(
            "NullSink: would decode and play {} bytes of ADTS AAC",
            adts_aac.len()
        );
        Ok(())
    }
}

/// Sample format/rate the control server requests from the audio device:
/// stereo 44.1 kHz signed 16-bit native-endian PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub const STEREO_44100_S16: PcmFormat = PcmFormat {
        sample_rate_hz: 44_100,
        channels: 2,
        bits_per_sample: 16,
    };
}

/// OSS (`/dev/dsp`) backed sink, implementing the
/// `SNDCTL_DSP_SETFMT`/`SNDCTL_DSP_CHANNELS`/`SNDCTL_DSP_SPEED` configuration
/// sequence the audio-sink contract requires.
///
/// Full AAC decode is out of scope; this implementation opens
/// and configures the device correctly and returns
/// [`SinkError::Unsupported`] at the decode step, which is sufficient to
/// prove the open/configure/play/close sequencing the control server
/// depends on without vendoring a decoder.
#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct OssSink {
    device_path: String,
}

#[cfg(target_os = "linux")]
impl OssSink {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    /// Default OSS device path.
    pub const DEFAULT_DEVICE: &'static str = "/dev/dsp";
}

#[cfg(target_os = "linux")]
impl AudioSink for OssSink {
    fn decode_and_play(&self, _adts_aac: &[u8]) -> Result<(), SinkError> {
        use std::fs::OpenOptions;
        use std::os::unix::io::AsRawFd;

        const SNDCTL_DSP_SPEED: libc::c_ulong = 0xC004_5002;
        const SNDCTL_DSP_SETFMT: libc::c_ulong = 0xC004_5005;
        const SNDCTL_DSP_CHANNELS: libc::c_ulong = 0xC004_5006;
        const AFMT_S16_NE: libc::c_int = if cfg!(target_endian = "big") {
            0x0000_0020
        } else {
            0x0000_0010
        };

        let file = OpenOptions::new()
            .write(true)
            .open(&self.device_path)
            .map_err(SinkError::OpenDevice)?;
        let fd = file.as_raw_fd();

        let mut fmt = AFMT_S16_NE;
        let mut channels = PcmFormat::STEREO_44100_S16.channels as libc::c_int;
        let mut speed = PcmFormat::STEREO_44100_S16.sample_rate_hz as libc::c_int;

        unsafe {
            if libc::ioctl(fd, SNDCTL_DSP_SETFMT, &mut fmt as *mut _) < 0 {
                return Err(SinkError::Io(std::io::Error::last_os_error()));
            }
            if libc::ioctl(fd, SNDCTL_DSP_CHANNELS, &mut channels as *mut _) < 0 {
                return Err(SinkError::Io(std::io::Error::last_os_error()));
            }
            if libc::ioctl(fd, SNDCTL_DSP_SPEED, &mut speed as *mut _) < 0 {
                return Err(SinkError::Io(std::io::Error::last_os_error()));
            }
        }

        // Device is opened and configured correctly; the actual ADTS/AAC
        // decode loop is outside this crate's scope.
        Err(SinkError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_always_succeeds() {
        let sink = NullSink;
        assert!(sink.decode_and_play(&[0xAB; 16]).is_ok());
    }
}
