//! Telnet option negotiation for TN3270 and TN3270E
//!
//! Tracks both directions of all 256 telnet options and answers the host's
//! WILL/WONT/DO/DONT according to a fixed per-option policy. Also builds the
//! replies to the TERMINAL-TYPE, NEW-ENVIRON, NAWS and START-TLS
//! subnegotiations.

use log::{debug, trace};

use crate::protocol_common::telnet_base::{
    build_negotiation, build_subnegotiation, option_name, NegotiationVerb, TelnetOption,
    NEW_ENV_ESC, NEW_ENV_USERVAR, NEW_ENV_VALUE, NEW_ENV_VAR, TELQUAL_IS, TLS_FOLLOWS,
};

/// Agreement state of one option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionState {
    /// We do it (we sent WILL and the host agreed, or the host asked with DO)
    pub local: bool,
    /// The host does it
    pub remote: bool,
}

/// How the negotiator answers an offer or request for an option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionPolicy {
    Accept,
    /// TN3270E, unless disabled for this host
    AcceptUnlessHostDisabled,
    /// TIMING-MARK, only with BSD compatibility on
    AcceptIfBsdTm,
    /// START-TLS, only when TLS is available and not yet active
    AcceptIfTlsAvailable,
    Reject,
}

/// Policy for the host's WILL
pub fn remote_policy(option: u8) -> OptionPolicy {
    match TelnetOption::from_u8(option) {
        Some(
            TelnetOption::SuppressGoAhead
            | TelnetOption::Binary
            | TelnetOption::EndOfRecord
            | TelnetOption::TerminalType
            | TelnetOption::Echo,
        ) => OptionPolicy::Accept,
        Some(TelnetOption::TN3270E) => OptionPolicy::AcceptUnlessHostDisabled,
        _ => OptionPolicy::Reject,
    }
}

/// Policy for the host's DO
pub fn local_policy(option: u8) -> OptionPolicy {
    match TelnetOption::from_u8(option) {
        Some(
            TelnetOption::Binary
            | TelnetOption::EndOfRecord
            | TelnetOption::TerminalType
            | TelnetOption::SuppressGoAhead
            | TelnetOption::NAWS
            | TelnetOption::NewEnvironment,
        ) => OptionPolicy::Accept,
        Some(TelnetOption::TN3270E) => OptionPolicy::AcceptUnlessHostDisabled,
        Some(TelnetOption::TimingMark) => OptionPolicy::AcceptIfBsdTm,
        Some(TelnetOption::StartTls) => OptionPolicy::AcceptIfTlsAvailable,
        _ => OptionPolicy::Reject,
    }
}

/// Switches that decide the conditional policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationSettings {
    pub tn3270e_allowed: bool,
    pub bsd_tm: bool,
    pub tls_available: bool,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            tn3270e_allowed: true,
            bsd_tm: false,
            tls_available: false,
        }
    }
}

/// Option negotiator
///
/// Replies are queued in an internal buffer; the session drains it with
/// [`TelnetNegotiator::take_output`] after every event, so replies stay in
/// receipt order.
#[derive(Debug)]
pub struct TelnetNegotiator {
    options: [OptionState; 256],
    do_sent: [bool; 256],
    settings: NegotiationSettings,
    secure: bool,
    output_buffer: Vec<u8>,
}

impl TelnetNegotiator {
    pub fn new(settings: NegotiationSettings) -> Self {
        Self {
            options: [OptionState::default(); 256],
            do_sent: [false; 256],
            settings,
            secure: false,
            output_buffer: Vec::new(),
        }
    }

    /// Forget all agreements, as for a new connection
    pub fn reset(&mut self) {
        self.options = [OptionState::default(); 256];
        self.do_sent = [false; 256];
        self.secure = false;
        self.output_buffer.clear();
    }

    pub fn settings(&self) -> &NegotiationSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut NegotiationSettings {
        &mut self.settings
    }

    pub fn state(&self, option: u8) -> OptionState {
        self.options[usize::from(option)]
    }

    pub fn local(&self, option: TelnetOption) -> bool {
        self.options[option as usize].local
    }

    pub fn remote(&self, option: TelnetOption) -> bool {
        self.options[option as usize].remote
    }

    /// The connection is already encrypted; START-TLS is refused from now on
    pub fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    /// NVT line mode: the host is not echoing
    pub fn line_mode(&self) -> bool {
        !self.remote(TelnetOption::Echo)
    }

    /// Send WILL for `option` unless already offered
    pub fn offer(&mut self, option: u8) {
        let idx = usize::from(option);
        if !self.options[idx].local {
            self.options[idx].local = true;
            self.send(NegotiationVerb::Will, option);
        }
    }

    /// Send DO for `option` unless the host already does it or was asked
    pub fn request(&mut self, option: u8) {
        let idx = usize::from(option);
        if !self.options[idx].remote && !self.do_sent[idx] {
            self.do_sent[idx] = true;
            self.send(NegotiationVerb::Do, option);
        }
    }

    /// Handle the host's WILL. Returns true when `remote` changed.
    pub fn on_will(&mut self, option: u8) -> bool {
        trace!("RCVD WILL {}", option_name(option));
        let idx = usize::from(option);
        if !self.allowed(remote_policy(option)) {
            self.send(NegotiationVerb::Dont, option);
            return false;
        }
        if self.options[idx].remote {
            return false;
        }
        self.options[idx].remote = true;
        if !std::mem::take(&mut self.do_sent[idx]) {
            self.send(NegotiationVerb::Do, option);
        }
        if option == TelnetOption::EndOfRecord as u8 {
            self.offer(option);
        }
        true
    }

    /// Handle the host's WONT. Returns true when `remote` changed.
    pub fn on_wont(&mut self, option: u8) -> bool {
        trace!("RCVD WONT {}", option_name(option));
        let idx = usize::from(option);
        self.do_sent[idx] = false;
        if !self.options[idx].remote {
            return false;
        }
        self.options[idx].remote = false;
        self.send(NegotiationVerb::Dont, option);
        true
    }

    /// Handle the host's DO. Returns true when `local` changed.
    pub fn on_do(&mut self, option: u8) -> bool {
        trace!("RCVD DO {}", option_name(option));
        let idx = usize::from(option);
        if !self.allowed(local_policy(option)) {
            self.send(NegotiationVerb::Wont, option);
            return false;
        }
        if option == TelnetOption::TimingMark as u8 {
            // Answered every time, never latched
            self.send(NegotiationVerb::Will, option);
            return false;
        }
        if self.options[idx].local {
            return false;
        }
        self.options[idx].local = true;
        self.send(NegotiationVerb::Will, option);
        true
    }

    /// Handle the host's DONT. Returns true when `local` changed.
    pub fn on_dont(&mut self, option: u8) -> bool {
        trace!("RCVD DONT {}", option_name(option));
        self.withdraw(option)
    }

    /// Stop doing `option` on our own initiative (WONT)
    pub fn withdraw(&mut self, option: u8) -> bool {
        let idx = usize::from(option);
        if !self.options[idx].local {
            return false;
        }
        self.options[idx].local = false;
        self.send(NegotiationVerb::Wont, option);
        true
    }

    pub fn has_output(&self) -> bool {
        !self.output_buffer.is_empty()
    }

    /// Drain queued replies
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output_buffer)
    }

    fn allowed(&self, policy: OptionPolicy) -> bool {
        match policy {
            OptionPolicy::Accept => true,
            OptionPolicy::AcceptUnlessHostDisabled => self.settings.tn3270e_allowed,
            OptionPolicy::AcceptIfBsdTm => self.settings.bsd_tm,
            OptionPolicy::AcceptIfTlsAvailable => self.settings.tls_available && !self.secure,
            OptionPolicy::Reject => false,
        }
    }

    fn send(&mut self, verb: NegotiationVerb, option: u8) {
        let cmd = verb.command();
        trace!("SENT {} {}", cmd.name(), option_name(option));
        self.output_buffer.extend_from_slice(&build_negotiation(cmd, option));
    }
}

/// `IAC SB TERMINAL-TYPE IS <type>[@<lu>] IAC SE`
pub fn terminal_type_reply(term_type: &str, lu: Option<&str>) -> Vec<u8> {
    let mut data = vec![TELQUAL_IS];
    data.extend_from_slice(term_type.as_bytes());
    if let Some(lu) = lu {
        data.push(b'@');
        data.extend_from_slice(lu.as_bytes());
    }
    trace!(
        "SENT SB TERMINAL-TYPE IS {term_type}{}{} SE",
        if lu.is_some() { "@" } else { "" },
        lu.unwrap_or("")
    );
    build_subnegotiation(TelnetOption::TerminalType as u8, &data)
}

/// `IAC SB NAWS <cols16> <rows16> IAC SE`, size bytes IAC-doubled
pub fn window_size(rows: u16, cols: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(4);
    data.extend_from_slice(&cols.to_be_bytes());
    data.extend_from_slice(&rows.to_be_bytes());
    trace!("SENT SB NAWS {cols} {rows} SE");
    build_subnegotiation(TelnetOption::NAWS as u8, &data)
}

/// `IAC SB START-TLS FOLLOWS IAC SE`
pub fn starttls_follows() -> Vec<u8> {
    trace!("SENT SB START-TLS FOLLOWS SE");
    build_subnegotiation(TelnetOption::StartTls as u8, &[TLS_FOLLOWS])
}

/// Variables this client can report through NEW-ENVIRON
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentValues<'a> {
    pub user: Option<&'a str>,
    pub devname: Option<&'a str>,
}

/// Reply to `SB NEW-ENVIRON SEND [list]`. `request` is the payload after
/// SEND. An empty list asks for everything; otherwise only the listed
/// variables are sent.
pub fn environment_reply(request: &[u8], values: &EnvironmentValues<'_>) -> Vec<u8> {
    let wanted = requested_variables(request);
    let wants = |kind: u8, name: &str| {
        wanted.is_empty()
            || wanted
                .iter()
                .any(|(k, n)| *k == kind && (n.is_empty() || n.as_slice() == name.as_bytes()))
    };

    let mut data = vec![TELQUAL_IS];
    if let Some(user) = values.user {
        if wants(NEW_ENV_VAR, "USER") {
            push_variable(&mut data, NEW_ENV_VAR, "USER", user);
        }
    }
    if let Some(devname) = values.devname {
        if wants(NEW_ENV_USERVAR, "DEVNAME") {
            push_variable(&mut data, NEW_ENV_USERVAR, "DEVNAME", devname);
        }
    }
    debug!("SENT SB NEW-ENVIRON IS ({} bytes) SE", data.len() - 1);
    build_subnegotiation(TelnetOption::NewEnvironment as u8, &data)
}

fn requested_variables(request: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut vars: Vec<(u8, Vec<u8>)> = Vec::new();
    let mut bytes = request.iter().copied();
    while let Some(byte) = bytes.next() {
        match byte {
            NEW_ENV_VAR | NEW_ENV_USERVAR => vars.push((byte, Vec::new())),
            NEW_ENV_ESC => {
                if let (Some(next), Some((_, name))) = (bytes.next(), vars.last_mut()) {
                    name.push(next);
                }
            }
            other => {
                if let Some((_, name)) = vars.last_mut() {
                    name.push(other);
                }
            }
        }
    }
    vars
}

fn push_variable(data: &mut Vec<u8>, kind: u8, name: &str, value: &str) {
    data.push(kind);
    push_env_escaped(data, name.as_bytes());
    data.push(NEW_ENV_VALUE);
    push_env_escaped(data, value.as_bytes());
}

fn push_env_escaped(data: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if matches!(b, NEW_ENV_VAR | NEW_ENV_VALUE | NEW_ENV_ESC | NEW_ENV_USERVAR) {
            data.push(NEW_ENV_ESC);
        }
        data.push(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_common::telnet_base::TelnetCommand;

    const WILL: u8 = TelnetCommand::WILL as u8;
    const WONT: u8 = TelnetCommand::WONT as u8;
    const DO: u8 = TelnetCommand::DO as u8;
    const DONT: u8 = TelnetCommand::DONT as u8;

    fn negotiator() -> TelnetNegotiator {
        TelnetNegotiator::new(NegotiationSettings::default())
    }

    #[test]
    fn test_will_binary_accepted_once() {
        let mut neg = negotiator();
        assert!(neg.on_will(0));
        assert_eq!(neg.take_output(), vec![255, DO, 0]);
        assert!(!neg.on_will(0));
        assert!(!neg.has_output());
        assert!(neg.remote(TelnetOption::Binary));
    }

    #[test]
    fn test_will_eor_volunteers_will() {
        let mut neg = negotiator();
        neg.on_will(25);
        assert_eq!(neg.take_output(), vec![255, DO, 25, 255, WILL, 25]);
        assert!(neg.local(TelnetOption::EndOfRecord));
        // A later DO EOR needs no answer
        assert!(!neg.on_do(25));
        assert!(!neg.has_output());
    }

    #[test]
    fn test_unknown_will_refused() {
        let mut neg = negotiator();
        assert!(!neg.on_will(34));
        assert_eq!(neg.take_output(), vec![255, DONT, 34]);
        assert!(!neg.remote(TelnetOption::Linemode));
    }

    #[test]
    fn test_do_policy() {
        let mut neg = negotiator();
        assert!(neg.on_do(24));
        assert_eq!(neg.take_output(), vec![255, WILL, 24]);
        assert!(!neg.on_do(1));
        assert_eq!(neg.take_output(), vec![255, WONT, 1]);
    }

    #[test]
    fn test_tn3270e_host_disabled() {
        let mut neg = TelnetNegotiator::new(NegotiationSettings {
            tn3270e_allowed: false,
            ..NegotiationSettings::default()
        });
        assert!(!neg.on_do(40));
        assert_eq!(neg.take_output(), vec![255, WONT, 40]);
        assert!(!neg.on_will(40));
        assert_eq!(neg.take_output(), vec![255, DONT, 40]);
    }

    #[test]
    fn test_timing_mark_needs_bsd_tm() {
        let mut neg = negotiator();
        neg.on_do(6);
        assert_eq!(neg.take_output(), vec![255, WONT, 6]);

        neg.settings_mut().bsd_tm = true;
        assert!(!neg.on_do(6));
        assert_eq!(neg.take_output(), vec![255, WILL, 6]);
        assert!(!neg.local(TelnetOption::TimingMark));
        neg.on_do(6);
        assert_eq!(neg.take_output(), vec![255, WILL, 6]);
    }

    #[test]
    fn test_starttls_policy() {
        let mut neg = negotiator();
        neg.on_do(46);
        assert_eq!(neg.take_output(), vec![255, WONT, 46]);

        neg.settings_mut().tls_available = true;
        assert!(neg.on_do(46));
        assert_eq!(neg.take_output(), vec![255, WILL, 46]);

        let mut neg = TelnetNegotiator::new(NegotiationSettings {
            tls_available: true,
            ..NegotiationSettings::default()
        });
        neg.set_secure(true);
        neg.on_do(46);
        assert_eq!(neg.take_output(), vec![255, WONT, 46]);
    }

    #[test]
    fn test_wont_and_dont_only_answer_active_options() {
        let mut neg = negotiator();
        assert!(!neg.on_wont(0));
        assert!(!neg.on_dont(0));
        assert!(!neg.has_output());

        neg.on_will(0);
        neg.on_do(0);
        neg.take_output();
        assert!(neg.on_wont(0));
        assert!(neg.on_dont(0));
        assert_eq!(neg.take_output(), vec![255, DONT, 0, 255, WONT, 0]);
    }

    #[test]
    fn test_request_suppresses_duplicate_do() {
        let mut neg = negotiator();
        neg.request(0);
        neg.request(0);
        assert_eq!(neg.take_output(), vec![255, DO, 0]);
        assert!(neg.on_will(0));
        assert!(!neg.has_output());
    }

    #[test]
    fn test_offer_once() {
        let mut neg = negotiator();
        neg.offer(0);
        neg.offer(0);
        assert_eq!(neg.take_output(), vec![255, WILL, 0]);
    }

    #[test]
    fn test_line_mode_follows_echo() {
        let mut neg = negotiator();
        assert!(neg.line_mode());
        neg.on_will(1);
        assert!(!neg.line_mode());
    }

    #[test]
    fn test_terminal_type_reply() {
        let reply = terminal_type_reply("IBM-3278-2", Some("LU01"));
        let mut expected = vec![255, 250, 24, TELQUAL_IS];
        expected.extend_from_slice(b"IBM-3278-2@LU01");
        expected.extend_from_slice(&[255, 240]);
        assert_eq!(reply, expected);
    }

    #[test]
    fn test_window_size_escapes_iac() {
        assert_eq!(window_size(43, 80), vec![255, 250, 31, 0, 80, 0, 43, 255, 240]);
        assert_eq!(
            window_size(24, 255),
            vec![255, 250, 31, 0, 255, 255, 0, 24, 255, 240]
        );
    }

    #[test]
    fn test_environment_reply_all() {
        let values = EnvironmentValues {
            user: Some("JOE"),
            devname: Some("LU01"),
        };
        let reply = environment_reply(&[], &values);
        let mut expected = vec![255, 250, 39, TELQUAL_IS, NEW_ENV_VAR];
        expected.extend_from_slice(b"USER");
        expected.push(NEW_ENV_VALUE);
        expected.extend_from_slice(b"JOE");
        expected.push(NEW_ENV_USERVAR);
        expected.extend_from_slice(b"DEVNAME");
        expected.push(NEW_ENV_VALUE);
        expected.extend_from_slice(b"LU01");
        expected.extend_from_slice(&[255, 240]);
        assert_eq!(reply, expected);
    }

    #[test]
    fn test_environment_reply_honors_list() {
        let values = EnvironmentValues {
            user: Some("JOE"),
            devname: Some("LU01"),
        };
        let mut request = vec![NEW_ENV_USERVAR];
        request.extend_from_slice(b"DEVNAME");
        let reply = environment_reply(&request, &values);
        assert!(!reply.windows(4).any(|w| w == b"USER"));
        assert!(reply.windows(7).any(|w| w == b"DEVNAME"));
    }
}
