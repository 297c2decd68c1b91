//! Transcode command description
use crate::{SampleRate, TrimWindow};

/// Output is always stereo
pub const OUTPUT_CHANNELS: u16 = 2;

/// Output sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 16-bit PCM
    #[default]
    S16,
}

impl SampleFormat {
    /// ffmpeg `-sample_fmt` name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S16 => "s16",
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            Self::S16 => 16,
        }
    }
}

/// One transform inside an engine's scratch namespace
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeCommand {
    /// Staged input entry
    pub input: String,

    /// Output entry to create
    pub output: String,

    pub sample_rate: SampleRate,
    pub channels: u16,
    pub sample_format: SampleFormat,

    /// Comma-joined filter chain; `None` means no `-af` argument
    pub filter_chain: Option<String>,

    pub trim: Option<TrimWindow>,
}

impl TranscodeCommand {
    pub fn new(
        input: impl Into<String>,
        output: impl Into<String>,
        sample_rate: SampleRate,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            sample_rate,
            channels: OUTPUT_CHANNELS,
            sample_format: SampleFormat::S16,
            filter_chain: None,
            trim: None,
        }
    }

    /// Attach a filter chain; an empty chain leaves the command unfiltered
    pub fn with_filter_chain(mut self, chain: impl Into<String>) -> Self {
        let chain = chain.into();
        self.filter_chain = if chain.is_empty() { None } else { Some(chain) };
        self
    }

    pub fn with_trim(mut self, trim: Option<TrimWindow>) -> Self {
        self.trim = trim;
        self
    }

    /// ffmpeg-style argument vector
    ///
    /// `-i <in> -ar <rate> -ac 2 -sample_fmt s16 [-af <chain>] [-ss <s> -to <e>] <out>`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            self.input.clone(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
            "-sample_fmt".to_string(),
            self.sample_format.as_str().to_string(),
        ];

        if let Some(chain) = &self.filter_chain {
            args.push("-af".to_string());
            args.push(chain.clone());
        }

        if let Some(trim) = &self.trim {
            args.push("-ss".to_string());
            args.push(trim.start_seconds.to_string());
            args.push("-to".to_string());
            args.push(trim.end_seconds.to_string());
        }

        args.push(self.output.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_args_have_no_filter() {
        let cmd = TranscodeCommand::new("in.mp3", "in_48000.wav", SampleRate::Hz48000)
            .with_filter_chain("");
        assert_eq!(
            cmd.to_args(),
            vec![
                "-i", "in.mp3", "-ar", "48000", "-ac", "2", "-sample_fmt", "s16", "in_48000.wav"
            ]
        );
    }

    #[test]
    fn test_filter_and_trim_args() {
        let cmd = TranscodeCommand::new("in.wav", "out.wav", SampleRate::Hz44100)
            .with_filter_chain("alimiter=limit=0.9")
            .with_trim(Some(TrimWindow::new(2.0, 5.5).unwrap()));
        let args = cmd.to_args();

        assert_eq!(&args[8..10], &["-af", "alimiter=limit=0.9"]);
        assert_eq!(&args[10..14], &["-ss", "2", "-to", "5.5"]);
        assert_eq!(args.last().unwrap(), "out.wav");
    }
}
