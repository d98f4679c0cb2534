//! Typed publish/subscribe handles over segments.

use super::{Backoff, Channel, ChannelLayout};
use crate::clock::ClockProvider;
use crate::error::{Result, ScaoError};
use crate::payload::Payload;
use crate::segment::{Segment, SegmentConfig, SegmentReader, SegmentSpec, SegmentWriter};
use crate::types::{Generation, Shape, Timestamp};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// A decoded sample with its generation and publish time.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<P> {
    /// Decoded payload.
    pub payload: P,
    /// Generation on its channel.
    pub generation: Generation,
    /// Writer's monotonic clock at publish.
    pub timestamp: Timestamp,
}

fn open_segment<P: Payload>(
    channel: Channel,
    layout: &ChannelLayout,
    config: &SegmentConfig,
) -> Result<Segment> {
    let spec = SegmentSpec::new(channel.name(), layout.shape(channel), P::DTYPE);
    Segment::create_or_attach(&spec, config)
}

/// Single writer of one channel.
pub struct Publisher<P> {
    writer: SegmentWriter,
    scratch: Vec<u8>,
    _payload: PhantomData<fn(&P)>,
}

impl<P: Payload> Publisher<P> {
    /// Create or attach the channel's segment and take its writer.
    pub fn open(channel: Channel, layout: &ChannelLayout, config: &SegmentConfig) -> Result<Self> {
        let segment = open_segment::<P>(channel, layout, config)?;
        Ok(Self::from_writer(segment.writer()))
    }

    /// Like [`open`](Self::open) with a custom clock.
    pub fn open_with_clock(
        channel: Channel,
        layout: &ChannelLayout,
        config: &SegmentConfig,
        clock: Arc<dyn ClockProvider>,
    ) -> Result<Self> {
        let segment = open_segment::<P>(channel, layout, config)?;
        Ok(Self::from_writer(segment.writer_with_clock(clock)))
    }

    /// Wrap an existing writer.
    pub fn from_writer(writer: SegmentWriter) -> Self {
        let scratch = vec![0u8; writer.payload_len()];
        Self {
            writer,
            scratch,
            _payload: PhantomData,
        }
    }

    /// Encode and publish a payload.
    ///
    /// A payload of the wrong shape is rejected before anything is written.
    pub fn publish(&mut self, payload: &P) -> Result<Generation> {
        let expected = self.writer.shape();
        let actual = payload.shape();
        if actual != expected {
            return Err(ScaoError::ShapeMismatch {
                channel: self.writer.channel().to_string(),
                expected,
                actual,
            });
        }
        payload.encode_into(&mut self.scratch);
        self.writer.publish(&self.scratch)
    }

    /// Segment shape.
    pub fn shape(&self) -> Shape {
        self.writer.shape()
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        self.writer.channel()
    }

    /// Latest published generation.
    pub fn generation(&self) -> Generation {
        self.writer.generation()
    }
}

/// Reader of one channel.
pub struct Subscriber<P> {
    reader: SegmentReader,
    scratch: Vec<u8>,
    stale_reads: u64,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload> Subscriber<P> {
    /// Create or attach the channel's segment as a reader.
    ///
    /// Readers may start before the writer; the segment is then created
    /// empty and reads report `NotYetWritten` until the first publish.
    pub fn open(channel: Channel, layout: &ChannelLayout, config: &SegmentConfig) -> Result<Self> {
        let segment = open_segment::<P>(channel, layout, config)?;
        Ok(Self::from_reader(segment.reader()))
    }

    /// Wrap an existing reader.
    pub fn from_reader(reader: SegmentReader) -> Self {
        let scratch = vec![0u8; reader.payload_len()];
        Self {
            reader,
            scratch,
            stale_reads: 0,
            _payload: PhantomData,
        }
    }

    /// Snapshot and decode the latest sample.
    pub fn latest(&mut self) -> Result<Sample<P>> {
        let meta = match self.reader.snapshot_into(&mut self.scratch) {
            Ok(meta) => meta,
            Err(e @ ScaoError::StaleRead { .. }) => {
                self.stale_reads += 1;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        if meta.attempts > 1 {
            tracing::trace!(
                channel = %self.reader.channel(),
                attempts = meta.attempts,
                generation = %meta.generation,
                "Snapshot needed retries"
            );
        }
        let payload =
            P::decode(self.reader.shape(), &self.scratch).map_err(|cause| ScaoError::PayloadDecode {
                channel: self.reader.channel().to_string(),
                cause,
            })?;
        Ok(Sample {
            payload,
            generation: meta.generation,
            timestamp: meta.timestamp,
        })
    }

    /// The latest sample if its generation is past `seen`.
    ///
    /// Checks the counter first so an unchanged channel costs no copy.
    pub fn latest_if_newer(&mut self, seen: Generation) -> Result<Option<Sample<P>>> {
        let current = self.reader.generation();
        if current <= seen {
            return Ok(None);
        }
        let sample = self.latest()?;
        Ok((sample.generation > seen).then_some(sample))
    }

    /// Poll until the channel's first publish, then return that sample.
    ///
    /// Stale reads while waiting are retried on the same schedule. Any
    /// other error is returned immediately. With `timeout`, gives up with
    /// `FirstWriteTimeout` once that much time has been spent waiting.
    pub async fn wait_for_first_write(
        &mut self,
        backoff: &Backoff,
        timeout: Option<Duration>,
    ) -> Result<Sample<P>> {
        let started = tokio::time::Instant::now();
        let mut delays = backoff.delays();
        let mut polls = 0u64;

        loop {
            polls += 1;
            match self.latest() {
                Ok(sample) => {
                    tracing::info!(
                        channel = %self.reader.channel(),
                        generation = %sample.generation,
                        polls,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "First write observed"
                    );
                    return Ok(sample);
                }
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            if let Some(limit) = timeout {
                if waited >= limit {
                    return Err(ScaoError::FirstWriteTimeout {
                        channel: self.reader.channel().to_string(),
                        waited,
                    });
                }
            }

            let delay = delays.next().unwrap_or(backoff.max());
            if polls == 1 {
                tracing::info!(channel = %self.reader.channel(), "Waiting for first write");
            } else {
                tracing::debug!(
                    channel = %self.reader.channel(),
                    polls,
                    delay_ms = delay.as_millis() as u64,
                    "Channel not yet written"
                );
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// Latest stable generation, without copying.
    pub fn generation(&self) -> Generation {
        self.reader.generation()
    }

    /// Segment shape.
    pub fn shape(&self) -> Shape {
        self.reader.shape()
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        self.reader.channel()
    }

    /// Reads that gave up with `StaleRead`.
    pub fn stale_reads(&self) -> u64 {
        self.stale_reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::payload::{PhaseMap, SlopeVector, SubapertureMask};
    use crate::types::DType;
    use tempfile::tempdir;

    fn layout() -> ChannelLayout {
        ChannelLayout {
            slopes: Shape::matrix(3, 2),
            phase: Shape::matrix(4, 4),
            valid_subapertures: Shape::matrix(2, 2),
        }
    }

    #[test]
    fn publish_then_read() {
        let dir = tempdir().unwrap();
        let config = SegmentConfig::default().with_directory(dir.path());
        let clock = Arc::new(MockClock::starting_at(Timestamp::from_nanos(1_000_000_000)));

        let mut publisher =
            Publisher::<SlopeVector>::open_with_clock(Channel::Slopes, &layout(), &config, clock)
                .unwrap();
        let mut subscriber = Subscriber::<SlopeVector>::open(Channel::Slopes, &layout(), &config)
            .unwrap();

        let slopes = SlopeVector::from_pairs(&[[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]);
        assert_eq!(publisher.publish(&slopes).unwrap(), Generation::new(1));

        let sample = subscriber.latest().unwrap();
        assert_eq!(sample.payload, slopes);
        assert_eq!(sample.generation, Generation::new(1));
        assert_eq!(sample.timestamp, Timestamp::from_nanos(1_000_000_000));
    }

    #[test]
    fn wrong_shape_is_rejected_before_write() {
        let dir = tempdir().unwrap();
        let config = SegmentConfig::default().with_directory(dir.path());
        let mut publisher =
            Publisher::<PhaseMap>::open(Channel::TruePhase, &layout(), &config).unwrap();

        let err = publisher.publish(&PhaseMap::zeros(8, 8)).unwrap_err();
        assert!(matches!(err, ScaoError::ShapeMismatch { .. }));
        assert_eq!(publisher.generation(), Generation::UNWRITTEN);
    }

    #[test]
    fn latest_if_newer_skips_seen() {
        let dir = tempdir().unwrap();
        let config = SegmentConfig::default().with_directory(dir.path());
        let mut publisher =
            Publisher::<PhaseMap>::open(Channel::ReconstructedPhase, &layout(), &config).unwrap();
        let mut subscriber =
            Subscriber::<PhaseMap>::open(Channel::ReconstructedPhase, &layout(), &config).unwrap();

        assert!(subscriber.latest_if_newer(Generation::UNWRITTEN).unwrap().is_none());

        publisher.publish(&PhaseMap::zeros(4, 4)).unwrap();
        let first = subscriber
            .latest_if_newer(Generation::UNWRITTEN)
            .unwrap()
            .unwrap();
        assert_eq!(first.generation, Generation::new(1));
        assert!(subscriber.latest_if_newer(first.generation).unwrap().is_none());
    }

    #[test]
    fn mask_channel_is_u8() {
        let dir = tempdir().unwrap();
        let config = SegmentConfig::default().with_directory(dir.path());
        let mut publisher =
            Publisher::<SubapertureMask>::open(Channel::ValidSubapertures, &layout(), &config)
                .unwrap();
        publisher
            .publish(&SubapertureMask::new(2, vec![true, false, false, true]))
            .unwrap();

        let status = Segment::inspect("valid_subaps", &config).unwrap();
        assert_eq!(status.header.dtype, DType::U8);
    }

    #[tokio::test(start_paused = true)]
    async fn first_write_times_out() {
        let dir = tempdir().unwrap();
        let config = SegmentConfig::default().with_directory(dir.path());
        let mut subscriber =
            Subscriber::<PhaseMap>::open(Channel::TruePhase, &layout(), &config).unwrap();

        let backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(8), 2.0);
        let err = subscriber
            .wait_for_first_write(&backoff, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, ScaoError::FirstWriteTimeout { .. }));
    }
}
