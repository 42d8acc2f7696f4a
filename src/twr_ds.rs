//! Double-sided two-way ranging
//!
//! Four messages make up one exchange:
//!
//! 1. The requester sends a request ([`MessageCode::DsTwr`]).
//! 2. The responder answers after a fixed holdoff ([`MessageCode::DsTwrT1`]),
//!    stating when it received the request and when the answer leaves.
//! 3. The requester answers that, again after the holdoff
//!    ([`MessageCode::DsTwrT2`]). Besides its own reception and transmission
//!    times, the frame carries the requester's view of the first round trip.
//! 4. The responder completes its own first-round set from that, and sends the
//!    second round trip back as the final report ([`MessageCode::DsTwrFinal`]).
//!
//! Afterwards both nodes hold the timestamps of two round trips, each measured
//! by a different clock. Combining them cancels the error a constant clock
//! offset would introduce into the time of flight, and reduces the error of a
//! clock drift to a second-order term.
//!
//! Every reply is scheduled at `rx_timestamp + holdoff`. As the transceiver
//! ignores the low 9 bits of a delayed send time, the transmission timestamp
//! stamped into the reply is that instant with those bits cleared, plus the
//! transmit antenna delay.

use ieee802154::mac::ShortAddress;
use log::{debug, info, trace, warn};

use crate::{
    config::Role,
    frame::{Frame, Layout, MessageCode},
    listener::{Completed, Listener, Listeners},
    radio::{AfterTx, MacInterface, ProtocolId, Radio, RxFrame, SendTime},
    session::Session,
    stats::Stat,
    time::Instant,
    Config, Error,
};

/// The double-sided two-way ranging handler set
///
/// Operates on a [`Session`] and notifies the registered [`Listener`]s when an
/// exchange ends. The radio driver feeds events in through the
/// [`MacInterface`] implementation.
pub struct DsTwr<'l, const N: usize> {
    session: Session<N>,
    listeners: Listeners<'l>,
}

impl<'l, const N: usize> DsTwr<'l, N> {
    /// Creates the handler set for `session`
    pub fn new(session: Session<N>) -> Self {
        info!(
            "twr_ds: init, {} frame ring, holdoff {}, rx timeout {}",
            N,
            session.config().tx_holdoff_delay,
            session.config().rx_timeout_delay,
        );

        DsTwr {
            session,
            listeners: Listeners::new(),
        }
    }

    /// The session this handler set works on
    pub fn session(&self) -> &Session<N> {
        &self.session
    }

    /// The session configuration
    pub fn config(&self) -> &Config {
        self.session.config()
    }

    /// Changes the session configuration
    pub fn set_config(&mut self, config: Config) {
        self.session.set_config(config);
    }

    /// Adds a listener that is told about finished and aborted exchanges
    ///
    /// Hands the listener back if no more listeners can be registered.
    pub fn register(&mut self, listener: &'l mut dyn Listener) -> Result<(), &'l mut dyn Listener> {
        self.listeners.register(listener)
    }

    /// Gives up the handler set, returning the session
    pub fn into_session(self) -> Session<N> {
        self.session
    }

    /// Starts an exchange with `dst` as the requester
    ///
    /// Takes the session token and sends the request right away. The exchange
    /// then proceeds through received frames. Whoever waits for the result
    /// can watch the token or register a [`Listener`].
    pub fn request<R: Radio>(
        &mut self,
        radio: &mut R,
        dst: ShortAddress,
    ) -> Result<(), Error<R::Error>> {
        if !self.session.acquire(MessageCode::DsTwrT1) {
            return Err(Error::Busy);
        }

        let idx = self.session.advance();
        let seq_num = self.session.next_seq_num();
        let frame = self.session.current_mut();
        frame.code = MessageCode::DsTwr;
        frame.seq_num = seq_num;
        frame.dst_address = dst;
        frame.src_address = radio.short_address();

        let timeout = self
            .session
            .config()
            .rx_timeout(radio.frame_duration(Layout::Response.len()));

        debug!("twr_ds: request {} to {:?}", seq_num, dst);

        self.transmit(
            radio,
            idx,
            Layout::Request,
            SendTime::Now,
            AfterTx::WaitForResponse { timeout },
        )
    }

    /// Waits for a request as the responder
    ///
    /// Takes the session token and turns on the receiver. Frames that arrive
    /// while the token is available are ignored, so a responder has to listen
    /// before it can answer.
    pub fn listen<R: Radio>(
        &mut self,
        radio: &mut R,
        timeout: Option<u32>,
    ) -> Result<(), Error<R::Error>> {
        if !self.session.acquire(MessageCode::DsTwr) {
            return Err(Error::Busy);
        }

        if let Err(error) = radio.start_rx(timeout) {
            self.session.release();
            return Err(Error::Radio(error));
        }
        Ok(())
    }

    /// Loads a received frame into the next ring slot and makes it current
    ///
    /// Does nothing if the frame doesn't have the length `code` is sent with,
    /// or if the stage needs a timestamp the radio couldn't provide.
    fn accept(&mut self, rx: &RxFrame, code: MessageCode) -> bool {
        let needs_timestamp = matches!(code, MessageCode::DsTwrT1 | MessageCode::DsTwrT2);
        if needs_timestamp && !rx.timestamp_valid {
            trace!("twr_ds: dropping {:?} with invalid timestamp", code);
            return false;
        }

        let next = self.session.idx().wrapping_add(1);
        let mut slot = *self.session.frame(next);

        if let Err(error) = slot.load(rx.bytes, code.layout()) {
            trace!("twr_ds: dropping frame: {}", error);
            return false;
        }

        self.session.advance();
        *self.session.current_mut() = slot;
        true
    }

    /// Returns when a reply to a frame received at `rx_timestamp` is sent,
    /// and the transmission timestamp that goes with it
    fn reply_time<R: Radio>(&self, radio: &R, rx_timestamp: Instant) -> (Instant, Instant) {
        let tx_delay = rx_timestamp + self.session.config().tx_holdoff();
        let tx_timestamp = tx_delay.tx_schedulable() + radio.tx_antenna_delay();
        (tx_delay, tx_timestamp)
    }

    /// Responder: a request arrived
    fn on_request<R: Radio>(&mut self, radio: &mut R, rx: &RxFrame) {
        let config = *self.session.config();
        let (response_tx_delay, response_timestamp) = self.reply_time(radio, rx.rx_timestamp);

        let idx = self.session.idx();
        let frame = self.session.current_mut();
        frame.reception_timestamp = rx.rx_timestamp.low_u32();
        frame.transmission_timestamp = response_timestamp.low_u32();
        frame.dst_address = frame.src_address;
        frame.src_address = radio.short_address();
        frame.carrier_integrator = config
            .clock_sync
            .carrier_integrator(rx.carrier_integrator, Role::Responder);
        frame.code = MessageCode::DsTwrT1;

        debug!(
            "twr_ds: request {} from {:?}, responding at {:#x}",
            frame.seq_num,
            frame.dst_address,
            response_tx_delay.value(),
        );

        self.session.await_next(MessageCode::DsTwrT2);
        let timeout = config.rx_timeout(radio.frame_duration(Layout::Response.len()));
        self.transmit(
            radio,
            idx,
            Layout::Response,
            SendTime::Delayed(response_tx_delay),
            AfterTx::WaitForResponse { timeout },
        )
        .ok();
    }

    /// Requester: the response to the request arrived
    fn on_response<R: Radio>(&mut self, radio: &mut R, rx: &RxFrame) {
        let config = *self.session.config();
        // When the request actually left, and when its response arrived.
        let request_timestamp = radio.tx_timestamp().low_u32();
        let response_timestamp = rx.rx_timestamp.low_u32();
        let (tx_delay, tx_timestamp) = self.reply_time(radio, rx.rx_timestamp);

        let idx = self.session.idx();
        let frame = self.session.current_mut();
        frame.request_timestamp = request_timestamp;
        frame.response_timestamp = response_timestamp;
        let responder = frame.src_address;
        let seq_num = frame.seq_num.wrapping_add(1);

        // The next slot carries the first round trip on to the responder.
        let next_idx = idx.wrapping_add(1);
        let next = self.session.frame_mut(next_idx);
        next.request_timestamp = request_timestamp;
        next.response_timestamp = response_timestamp;
        next.dst_address = responder;
        next.src_address = radio.short_address();
        next.seq_num = seq_num;
        next.code = MessageCode::DsTwrT2;
        next.reception_timestamp = response_timestamp;
        next.transmission_timestamp = tx_timestamp.low_u32();
        next.carrier_integrator = config
            .clock_sync
            .carrier_integrator(rx.carrier_integrator, Role::Requester);

        debug!(
            "twr_ds: response from {:?}, second request at {:#x}",
            responder,
            tx_delay.value(),
        );

        self.session.await_next(MessageCode::DsTwrFinal);
        let timeout = config.rx_timeout(radio.frame_duration(Layout::Final.len()));
        self.transmit(
            radio,
            next_idx,
            Layout::Final,
            SendTime::Delayed(tx_delay),
            AfterTx::WaitForResponse { timeout },
        )
        .ok();
    }

    /// Responder: the second request arrived
    fn on_second_request<R: Radio>(&mut self, radio: &mut R, rx: &RxFrame) {
        let clock_sync = self.session.config().clock_sync;
        let idx = self.session.idx();

        // Complete the first round trip, held in the slot of the response.
        let (request_timestamp, response_timestamp) = {
            let frame = self.session.current();
            (frame.request_timestamp, frame.response_timestamp)
        };
        let previous = self.session.frame_mut(idx.wrapping_sub(1));
        previous.request_timestamp = request_timestamp;
        previous.response_timestamp = response_timestamp;

        // When the response actually left, and when this frame arrived.
        let response_tx = radio.tx_timestamp().low_u32();
        let frame = self.session.current_mut();
        frame.request_timestamp = response_tx;
        frame.response_timestamp = rx.rx_timestamp.low_u32();
        frame.dst_address = frame.src_address;
        frame.src_address = radio.short_address();
        frame.carrier_integrator =
            clock_sync.carrier_integrator(rx.carrier_integrator, Role::Responder);
        frame.code = MessageCode::DsTwrFinal;

        debug!("twr_ds: second request from {:?}, sending final", frame.dst_address);

        if self
            .transmit(radio, idx, Layout::Final, SendTime::Now, AfterTx::Idle)
            .is_ok()
        {
            self.complete(Role::Responder);
        }
    }

    /// Requester: the final report arrived
    fn on_final<R: Radio>(&mut self, radio: &mut R) {
        let rx_mode = radio.rx_mode();
        if rx_mode.double_buffered && rx_mode.rx_auto_reenable {
            // Keeps the receive timeout from firing after the exchange ended.
            radio.stop_rx();
        }

        self.complete(Role::Requester);
    }

    /// Sends the frame in slot `idx`
    ///
    /// If the radio refuses, the exchange is aborted.
    fn transmit<R: Radio>(
        &mut self,
        radio: &mut R,
        idx: u16,
        layout: Layout,
        time: SendTime,
        after: AfterTx,
    ) -> Result<(), Error<R::Error>> {
        let mut buf = [0; Layout::MAX_LEN];
        let result = match self.session.frame(idx).encode(&mut buf, layout) {
            Ok(len) => radio
                .start_tx(&buf[..len], time, after)
                .map_err(Error::Radio),
            Err(error) => Err(Error::Frame(error)),
        };

        if let Err(error) = &result {
            warn!("twr_ds: failed to start transmission: {:?}", error);
            self.abort_start_tx();
        }
        result
    }

    /// Counts a transmission that could not be scheduled, and ends the
    /// exchange in progress, if any
    ///
    /// Returns whether there was an exchange to end.
    fn abort_start_tx(&mut self) -> bool {
        self.session.incr(Stat::StartTxError);
        if !self.session.release() {
            return false;
        }
        self.listeners.start_tx_error();
        true
    }

    fn complete(&mut self, role: Role) {
        self.session.incr(Stat::Complete);
        self.session.release();

        let exchange = Completed {
            role,
            first: self.session.previous(),
            second: self.session.current(),
        };
        let used = self.listeners.complete(&exchange);

        debug!(
            "twr_ds: exchange {} complete as {:?}, {} of {} listeners used it",
            exchange.second.seq_num,
            role,
            used,
            self.listeners.len(),
        );
    }
}

impl<'l, R, const N: usize> MacInterface<R> for DsTwr<'l, N>
where
    R: Radio,
{
    fn id(&self) -> ProtocolId {
        ProtocolId::RngDs
    }

    fn rx_complete(&mut self, radio: &mut R, rx: &RxFrame) -> bool {
        let code = match Frame::peek_code(rx.bytes) {
            Ok(code) => code,
            Err(_) => return false,
        };

        if !self.session.is_busy() {
            trace!("twr_ds: unsolicited {:?}", code);
            return false;
        }
        if self.session.awaiting() != Some(code) {
            trace!(
                "twr_ds: {:?} out of order, awaiting {:?}",
                code,
                self.session.awaiting()
            );
            return false;
        }

        if !self.accept(rx, code) {
            return true;
        }
        match code {
            MessageCode::DsTwr => self.on_request(radio, rx),
            MessageCode::DsTwrT1 => self.on_response(radio, rx),
            MessageCode::DsTwrT2 => self.on_second_request(radio, rx),
            MessageCode::DsTwrFinal => self.on_final(radio),
        }
        true
    }

    fn reset(&mut self, _: &mut R) -> bool {
        if self.session.release() {
            self.session.incr(Stat::Reset);
            debug!("twr_ds: reset, exchange abandoned");
            true
        } else {
            false
        }
    }

    fn start_tx_error(&mut self, _: &mut R) -> bool {
        if self.abort_start_tx() {
            warn!("twr_ds: transmission could not be scheduled, exchange aborted");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::{
        config::ClockSync,
        radio::RxMode,
        stats::Stats,
        time::{Duration, TX_TIME_MASK},
        Token,
    };

    const REQUESTER: ShortAddress = ShortAddress(0x0a0a);
    const RESPONDER: ShortAddress = ShortAddress(0x0b0b);

    struct Sent {
        buf: [u8; Layout::MAX_LEN],
        len: usize,
        time: SendTime,
        after: AfterTx,
    }

    impl Sent {
        fn frame(&self) -> Frame {
            let layout = match self.len {
                6 => Layout::Request,
                18 => Layout::Response,
                _ => Layout::Final,
            };
            let mut frame = Frame::default();
            frame.load(&self.buf[..self.len], layout).unwrap();
            frame
        }
    }

    struct MockRadio {
        address: ShortAddress,
        antenna_delay: Duration,
        last_tx: Instant,
        fail_tx: bool,
        rx_mode: RxMode,
        sent: Option<Sent>,
        tx_count: usize,
        rx_stopped: bool,
    }

    impl MockRadio {
        fn new(address: ShortAddress) -> Self {
            MockRadio {
                address,
                antenna_delay: Duration::new(16450).unwrap(),
                last_tx: Instant::new(0x00_1000_0000).unwrap(),
                fail_tx: false,
                rx_mode: RxMode::default(),
                sent: None,
                tx_count: 0,
                rx_stopped: false,
            }
        }

        fn last_sent(&self) -> &Sent {
            self.sent.as_ref().unwrap()
        }
    }

    impl Radio for MockRadio {
        type Error = ();

        fn short_address(&self) -> ShortAddress {
            self.address
        }

        fn tx_antenna_delay(&self) -> Duration {
            self.antenna_delay
        }

        fn tx_timestamp(&mut self) -> Instant {
            self.last_tx
        }

        fn frame_duration(&self, len: usize) -> u16 {
            len as u16 * 10
        }

        fn rx_mode(&self) -> RxMode {
            self.rx_mode
        }

        fn start_tx(&mut self, frame: &[u8], time: SendTime, after: AfterTx) -> Result<(), ()> {
            if self.fail_tx {
                return Err(());
            }
            let mut buf = [0; Layout::MAX_LEN];
            buf[..frame.len()].copy_from_slice(frame);
            self.sent = Some(Sent {
                buf,
                len: frame.len(),
                time,
                after,
            });
            self.tx_count += 1;
            Ok(())
        }

        fn start_rx(&mut self, _: Option<u32>) -> Result<(), ()> {
            Ok(())
        }

        fn stop_rx(&mut self) {
            self.rx_stopped = true;
        }
    }

    struct Counter<'a> {
        complete: &'a Cell<u32>,
        tx_error: &'a Cell<u32>,
        role: &'a Cell<Option<Role>>,
    }

    impl Listener for Counter<'_> {
        fn complete(&mut self, exchange: &Completed) -> bool {
            self.complete.set(self.complete.get() + 1);
            self.role.set(Some(exchange.role));
            true
        }

        fn start_tx_error(&mut self) -> bool {
            self.tx_error.set(self.tx_error.get() + 1);
            true
        }
    }

    fn config(tx_holdoff_delay: u32, clock_sync: ClockSync) -> Config {
        Config {
            tx_holdoff_delay,
            rx_timeout_delay: 0x30,
            clock_sync,
        }
    }

    fn encode(frame: &Frame, layout: Layout) -> ([u8; Layout::MAX_LEN], usize) {
        let mut buf = [0; Layout::MAX_LEN];
        let len = frame.encode(&mut buf, layout).unwrap();
        (buf, len)
    }

    fn rx<'a>(bytes: &'a [u8], rx_timestamp: u64, carrier_integrator: i32) -> RxFrame<'a> {
        RxFrame {
            bytes,
            rx_timestamp: Instant::new(rx_timestamp).unwrap(),
            timestamp_valid: true,
            carrier_integrator,
        }
    }

    fn request_frame() -> Frame {
        Frame {
            code: MessageCode::DsTwr,
            seq_num: 5,
            dst_address: RESPONDER,
            src_address: REQUESTER,
            ..Frame::default()
        }
    }

    fn response_frame() -> Frame {
        Frame {
            code: MessageCode::DsTwrT1,
            seq_num: 1,
            dst_address: REQUESTER,
            src_address: RESPONDER,
            reception_timestamp: 0x1111,
            transmission_timestamp: 0x2222,
            carrier_integrator: -7,
            ..Frame::default()
        }
    }

    fn second_request_frame() -> Frame {
        Frame {
            code: MessageCode::DsTwrT2,
            seq_num: 6,
            dst_address: RESPONDER,
            src_address: REQUESTER,
            reception_timestamp: 0x3333,
            transmission_timestamp: 0x4444,
            carrier_integrator: 9,
            request_timestamp: 0xaaaa,
            response_timestamp: 0xbbbb,
        }
    }

    /// A responder that has answered a request received at `rx_timestamp`
    fn responding<'l>(radio: &mut MockRadio, config: Config, rx_timestamp: u64) -> DsTwr<'l, 4> {
        let mut twr = DsTwr::new(Session::<4>::new(config));
        twr.listen(radio, None).unwrap();

        let (buf, len) = encode(&request_frame(), Layout::Request);
        assert!(twr.rx_complete(radio, &rx(&buf[..len], rx_timestamp, 1234)));
        twr
    }

    #[test]
    fn response_is_scheduled_after_the_holdoff() {
        let mut radio = MockRadio::new(RESPONDER);
        let request_timestamp = 0x0000_0001_2345_6789;
        let twr = responding(&mut radio, config(100, ClockSync::Disabled), request_timestamp);

        let response_tx_delay = request_timestamp + (100 << 16);
        let expected_tx = ((response_tx_delay & TX_TIME_MASK) + 16450) as u32;

        let sent = radio.last_sent();
        assert_eq!(
            sent.time,
            SendTime::Delayed(Instant::new(response_tx_delay).unwrap())
        );
        assert_eq!(
            sent.after,
            AfterTx::WaitForResponse {
                timeout: 180 + 0x30 + 100
            }
        );

        let frame = sent.frame();
        assert_eq!(frame.code, MessageCode::DsTwrT1);
        assert_eq!(frame.transmission_timestamp, expected_tx);
        assert_eq!(frame.reception_timestamp, 0x2345_6789);
        assert_eq!(frame.dst_address, REQUESTER);
        assert_eq!(frame.src_address, RESPONDER);
        assert_eq!(frame.seq_num, 5);

        assert_eq!(twr.session().current(), &frame);
        assert_eq!(twr.session().awaiting(), Some(MessageCode::DsTwrT2));
        assert_eq!(twr.session().token(), Token::Busy);
    }

    #[test]
    fn responder_stamps_negated_carrier_integrator() {
        let mut radio = MockRadio::new(RESPONDER);
        responding(&mut radio, config(100, ClockSync::Disabled), 1000);
        assert_eq!(radio.last_sent().frame().carrier_integrator, -1234);

        let mut radio = MockRadio::new(RESPONDER);
        responding(&mut radio, config(100, ClockSync::Enabled), 1000);
        assert_eq!(radio.last_sent().frame().carrier_integrator, 0);
    }

    #[test]
    fn requester_forwards_first_round_trip() {
        let mut radio = MockRadio::new(REQUESTER);
        let mut twr = DsTwr::new(Session::<4>::new(config(100, ClockSync::Disabled)));
        twr.request(&mut radio, RESPONDER).unwrap();

        let request = radio.last_sent().frame();
        assert_eq!(request.code, MessageCode::DsTwr);
        assert_eq!(request.dst_address, RESPONDER);
        assert_eq!(radio.last_sent().time, SendTime::Now);

        radio.last_tx = Instant::new(0x12_0000_0042).unwrap();
        let (buf, len) = encode(&response_frame(), Layout::Response);
        assert!(twr.rx_complete(&mut radio, &rx(&buf[..len], 0x12_0020_0000, 1234)));

        let current = *twr.session().current();
        assert_eq!(current.request_timestamp, 0x0000_0042);
        assert_eq!(current.response_timestamp, 0x0020_0000);
        assert_eq!(current.reception_timestamp, 0x1111);
        assert_eq!(current.transmission_timestamp, 0x2222);

        let sent = radio.last_sent().frame();
        assert_eq!(sent.code, MessageCode::DsTwrT2);
        assert_eq!(sent.seq_num, 2);
        assert_eq!(sent.dst_address, RESPONDER);
        assert_eq!(sent.src_address, REQUESTER);
        assert_eq!(sent.request_timestamp, 0x0000_0042);
        assert_eq!(sent.response_timestamp, 0x0020_0000);
        assert_eq!(sent.reception_timestamp, 0x0020_0000);
        assert_eq!(sent.carrier_integrator, 1234);
        assert_eq!(twr.session().awaiting(), Some(MessageCode::DsTwrFinal));
    }

    #[test]
    fn requester_stamps_zero_under_clock_sync() {
        let mut radio = MockRadio::new(REQUESTER);
        let mut twr = DsTwr::new(Session::<4>::new(config(100, ClockSync::Enabled)));
        twr.request(&mut radio, RESPONDER).unwrap();

        let (buf, len) = encode(&response_frame(), Layout::Response);
        twr.rx_complete(&mut radio, &rx(&buf[..len], 0x10_0000, 1234));

        assert_eq!(radio.last_sent().frame().carrier_integrator, 0);
    }

    #[test]
    fn responder_completes_after_sending_final() {
        let complete = Cell::new(0);
        let tx_error = Cell::new(0);
        let role = Cell::new(None);
        let mut counter = Counter {
            complete: &complete,
            tx_error: &tx_error,
            role: &role,
        };

        let mut radio = MockRadio::new(RESPONDER);
        let mut twr = responding(&mut radio, config(100, ClockSync::Disabled), 0x40_0000);
        assert!(twr.register(&mut counter).is_ok());

        radio.last_tx = Instant::new(0x00_00a0_0000).unwrap();
        let (buf, len) = encode(&second_request_frame(), Layout::Final);
        assert!(twr.rx_complete(&mut radio, &rx(&buf[..len], 0x00_0140_0000, 55)));

        let previous = *twr.session().previous();
        assert_eq!(previous.code, MessageCode::DsTwrT1);
        assert_eq!(previous.request_timestamp, 0xaaaa);
        assert_eq!(previous.response_timestamp, 0xbbbb);
        assert_eq!(previous.reception_timestamp, 0x40_0000);

        let sent = radio.last_sent();
        assert_eq!(sent.time, SendTime::Now);
        assert_eq!(sent.after, AfterTx::Idle);
        let final_frame = sent.frame();
        assert_eq!(final_frame.code, MessageCode::DsTwrFinal);
        assert_eq!(final_frame.request_timestamp, 0x00a0_0000);
        assert_eq!(final_frame.response_timestamp, 0x0140_0000);
        assert_eq!(final_frame.reception_timestamp, 0x3333);
        assert_eq!(final_frame.transmission_timestamp, 0x4444);
        assert_eq!(final_frame.carrier_integrator, -55);
        assert_eq!(final_frame.dst_address, REQUESTER);

        assert_eq!(twr.session().token(), Token::Available);
        assert_eq!(twr.session().stats().get(Stat::Complete), 1);
        assert_eq!(complete.get(), 1);
        assert_eq!(role.get(), Some(Role::Responder));
    }

    #[test]
    fn requester_completes_on_final() {
        let mut radio = MockRadio::new(REQUESTER);
        radio.rx_mode = RxMode {
            double_buffered: true,
            rx_auto_reenable: true,
        };
        let mut twr = DsTwr::new(Session::<4>::new(config(100, ClockSync::Disabled)));
        twr.request(&mut radio, RESPONDER).unwrap();

        let (buf, len) = encode(&response_frame(), Layout::Response);
        twr.rx_complete(&mut radio, &rx(&buf[..len], 0x10_0000, 0));

        let final_frame = Frame {
            code: MessageCode::DsTwrFinal,
            ..second_request_frame()
        };
        let (buf, len) = encode(&final_frame, Layout::Final);
        assert!(twr.rx_complete(&mut radio, &rx(&buf[..len], 0x20_0000, 0)));

        assert!(radio.rx_stopped);
        assert_eq!(twr.session().token(), Token::Available);
        assert_eq!(twr.session().stats().get(Stat::Complete), 1);
        assert_eq!(twr.session().current(), &final_frame);
        assert_eq!(twr.session().previous().code, MessageCode::DsTwrT1);
    }

    #[test]
    fn final_leaves_receiver_alone_in_single_buffer_mode() {
        let mut radio = MockRadio::new(REQUESTER);
        let mut twr = DsTwr::new(Session::<4>::new(config(100, ClockSync::Disabled)));
        twr.request(&mut radio, RESPONDER).unwrap();

        let (buf, len) = encode(&response_frame(), Layout::Response);
        twr.rx_complete(&mut radio, &rx(&buf[..len], 0x10_0000, 0));
        let final_frame = Frame {
            code: MessageCode::DsTwrFinal,
            ..second_request_frame()
        };
        let (buf, len) = encode(&final_frame, Layout::Final);
        twr.rx_complete(&mut radio, &rx(&buf[..len], 0x20_0000, 0));

        assert!(!radio.rx_stopped);
        assert_eq!(twr.session().token(), Token::Available);
    }

    #[test]
    fn unsolicited_frames_are_ignored() {
        let mut radio = MockRadio::new(RESPONDER);
        let mut twr = DsTwr::new(Session::<4>::new(Config::default()));

        let (buf, len) = encode(&request_frame(), Layout::Request);
        assert!(!twr.rx_complete(&mut radio, &rx(&buf[..len], 1000, 0)));

        assert_eq!(radio.tx_count, 0);
        assert_eq!(twr.session().idx(), 0);
        assert_eq!(twr.session().token(), Token::Available);
    }

    #[test]
    fn wrong_length_is_dropped_without_side_effects() {
        let mut radio = MockRadio::new(RESPONDER);
        let mut twr = responding(&mut radio, Config::default(), 0x40_0000);

        let idx = twr.session().idx();
        let frames: [Frame; 4] = [
            *twr.session().frame(0),
            *twr.session().frame(1),
            *twr.session().frame(2),
            *twr.session().frame(3),
        ];
        let stats = *twr.session().stats();

        let (buf, _) = encode(&second_request_frame(), Layout::Final);
        for len in 1..Layout::MAX_LEN {
            assert!(twr.rx_complete(&mut radio, &rx(&buf[..len], 0x80_0000, 0)));
        }

        assert_eq!(radio.tx_count, 1);
        assert_eq!(twr.session().idx(), idx);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(twr.session().frame(i as u16), frame);
        }
        assert_eq!(twr.session().stats(), &stats);
        assert_eq!(twr.session().awaiting(), Some(MessageCode::DsTwrT2));
    }

    #[test]
    fn out_of_order_codes_are_ignored() {
        let mut radio = MockRadio::new(RESPONDER);
        let mut twr = responding(&mut radio, Config::default(), 0x40_0000);
        let current = *twr.session().current();

        let (buf, len) = encode(&request_frame(), Layout::Request);
        assert!(!twr.rx_complete(&mut radio, &rx(&buf[..len], 0x80_0000, 0)));
        let (buf, len) = encode(&response_frame(), Layout::Response);
        assert!(!twr.rx_complete(&mut radio, &rx(&buf[..len], 0x80_0000, 0)));

        assert_eq!(radio.tx_count, 1);
        assert_eq!(twr.session().current(), &current);
        assert_eq!(twr.session().stats(), &Stats::default());
    }

    #[test]
    fn foreign_frames_are_not_claimed() {
        let mut radio = MockRadio::new(RESPONDER);
        let mut twr = DsTwr::new(Session::<4>::new(Config::default()));
        twr.listen(&mut radio, None).unwrap();

        assert!(!twr.rx_complete(&mut radio, &rx(&[0x10, 0, 0, 0, 0, 0], 0, 0)));
        assert!(!twr.rx_complete(&mut radio, &rx(&[], 0, 0)));
        assert_eq!(twr.session().idx(), 0);
    }

    #[test]
    fn invalid_timestamp_sends_no_reply() {
        let mut radio = MockRadio::new(REQUESTER);
        let mut twr = DsTwr::new(Session::<4>::new(Config::default()));
        twr.request(&mut radio, RESPONDER).unwrap();
        let idx = twr.session().idx();

        let (buf, len) = encode(&response_frame(), Layout::Response);
        let frame = RxFrame {
            timestamp_valid: false,
            ..rx(&buf[..len], 0x10_0000, 0)
        };
        assert!(twr.rx_complete(&mut radio, &frame));

        assert_eq!(radio.tx_count, 1);
        assert_eq!(twr.session().idx(), idx);
        assert_eq!(twr.session().token(), Token::Busy);
    }

    #[test]
    fn failed_reply_releases_the_token() {
        let complete = Cell::new(0);
        let tx_error = Cell::new(0);
        let role = Cell::new(None);
        let mut counter = Counter {
            complete: &complete,
            tx_error: &tx_error,
            role: &role,
        };

        let mut radio = MockRadio::new(RESPONDER);
        radio.fail_tx = true;
        let mut twr = DsTwr::new(Session::<4>::new(Config::default()));
        assert!(twr.register(&mut counter).is_ok());
        twr.listen(&mut radio, None).unwrap();

        let (buf, len) = encode(&request_frame(), Layout::Request);
        assert!(twr.rx_complete(&mut radio, &rx(&buf[..len], 0x40_0000, 0)));

        assert_eq!(twr.session().token(), Token::Available);
        assert_eq!(twr.session().awaiting(), None);
        assert_eq!(twr.session().stats().get(Stat::StartTxError), 1);
        assert_eq!(tx_error.get(), 1);
        assert_eq!(complete.get(), 0);

        // The session is usable again.
        radio.fail_tx = false;
        assert!(twr.listen(&mut radio, None).is_ok());
    }

    #[test]
    fn failed_final_does_not_complete() {
        let mut radio = MockRadio::new(RESPONDER);
        let mut twr = responding(&mut radio, Config::default(), 0x40_0000);
        radio.fail_tx = true;

        let (buf, len) = encode(&second_request_frame(), Layout::Final);
        twr.rx_complete(&mut radio, &rx(&buf[..len], 0x80_0000, 0));

        assert_eq!(twr.session().token(), Token::Available);
        assert_eq!(twr.session().stats().get(Stat::Complete), 0);
        assert_eq!(twr.session().stats().get(Stat::StartTxError), 1);
    }

    #[test]
    fn failed_request_is_reported() {
        let mut radio = MockRadio::new(REQUESTER);
        radio.fail_tx = true;
        let mut twr = DsTwr::new(Session::<4>::new(Config::default()));

        assert!(matches!(
            twr.request(&mut radio, RESPONDER),
            Err(Error::Radio(()))
        ));
        assert_eq!(twr.session().token(), Token::Available);
        assert_eq!(twr.session().stats().get(Stat::StartTxError), 1);
    }

    #[test]
    fn one_exchange_at_a_time() {
        let mut radio = MockRadio::new(REQUESTER);
        let mut twr = DsTwr::new(Session::<4>::new(Config::default()));

        twr.request(&mut radio, RESPONDER).unwrap();
        assert!(matches!(twr.request(&mut radio, RESPONDER), Err(Error::Busy)));
        assert!(matches!(twr.listen(&mut radio, None), Err(Error::Busy)));
        assert_eq!(radio.tx_count, 1);
    }

    #[test]
    fn reset_releases_only_a_held_token() {
        let mut radio = MockRadio::new(REQUESTER);
        let mut twr = DsTwr::new(Session::<4>::new(Config::default()));

        assert!(!twr.reset(&mut radio));
        assert_eq!(twr.session().stats().get(Stat::Reset), 0);

        twr.request(&mut radio, RESPONDER).unwrap();
        assert!(twr.reset(&mut radio));
        assert_eq!(twr.session().token(), Token::Available);
        assert_eq!(twr.session().stats().get(Stat::Reset), 1);

        assert!(!twr.reset(&mut radio));
        assert_eq!(twr.session().stats().get(Stat::Reset), 1);
    }

    #[test]
    fn start_tx_error_hook_aborts_the_exchange() {
        let mut radio = MockRadio::new(REQUESTER);
        let mut twr = DsTwr::new(Session::<4>::new(Config::default()));
        twr.request(&mut radio, RESPONDER).unwrap();

        assert!(twr.start_tx_error(&mut radio));
        assert_eq!(twr.session().token(), Token::Available);
        assert_eq!(twr.session().stats().get(Stat::StartTxError), 1);
        assert_eq!(MacInterface::<MockRadio>::id(&twr), ProtocolId::RngDs);
    }

    #[test]
    fn start_tx_error_while_idle_is_only_counted() {
        let complete = Cell::new(0);
        let tx_error = Cell::new(0);
        let role = Cell::new(None);
        let mut counter = Counter {
            complete: &complete,
            tx_error: &tx_error,
            role: &role,
        };

        let mut radio = MockRadio::new(REQUESTER);
        let mut twr = DsTwr::new(Session::<4>::new(Config::default()));
        assert!(twr.register(&mut counter).is_ok());

        assert!(!twr.start_tx_error(&mut radio));
        assert_eq!(twr.session().token(), Token::Available);
        assert_eq!(twr.session().stats().get(Stat::StartTxError), 1);
        assert_eq!(tx_error.get(), 0);
    }
}
