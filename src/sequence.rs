//! Sequence accumulation: turns raw parser events into resolved
//! [`Function`] dispatches plus coalesced text batches.

use crate::functions::{
    Function, FunctionCategory, FunctionSelector, SupportedSequences, VtType, ARGS_MAX,
};
use crate::parser::Perform;

pub const MAX_PARAMS: usize = ARGS_MAX as usize;
pub const MAX_SUBPARAMS: usize = 16;
/// Payload cap for OSC and non-Sixel DCS strings.
pub const MAX_PAYLOAD: usize = 1024;
/// Sixel streams bypass the payload cap but are still bounded.
pub const MAX_SIXEL_PAYLOAD: usize = 16 * 1024 * 1024;

/// Parameter list with sub-parameter support (`;` / `:` separated), stored
/// inline so accumulation never allocates.
#[derive(Debug, Clone)]
pub struct Params {
    values: [[u16; MAX_SUBPARAMS]; MAX_PARAMS],
    sub_counts: [u8; MAX_PARAMS],
    count: usize,
    /// Digits seen for the current (sub-)parameter.
    current: u16,
    current_seen: bool,
    any: bool,
    truncated: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            values: [[0; MAX_SUBPARAMS]; MAX_PARAMS],
            sub_counts: [0; MAX_PARAMS],
            count: 0,
            current: 0,
            current_seen: false,
            any: false,
            truncated: false,
        }
    }
}

impl Params {
    fn reset(&mut self) {
        self.sub_counts = [0; MAX_PARAMS];
        self.count = 0;
        self.current = 0;
        self.current_seen = false;
        self.any = false;
        self.truncated = false;
    }

    fn digit(&mut self, digit: u8) {
        self.any = true;
        self.current_seen = true;
        self.current = self.current.saturating_mul(10).saturating_add(digit as u16);
    }

    fn commit_sub(&mut self) {
        if self.count >= MAX_PARAMS {
            self.truncated = true;
            self.current = 0;
            self.current_seen = false;
            return;
        }
        let sub = self.sub_counts[self.count] as usize;
        if sub >= MAX_SUBPARAMS {
            self.truncated = true;
        } else {
            self.values[self.count][sub] = self.current;
            self.sub_counts[self.count] = sub as u8 + 1;
        }
        self.current = 0;
        self.current_seen = false;
    }

    fn separator(&mut self) {
        self.any = true;
        self.commit_sub();
        if self.count < MAX_PARAMS {
            self.count += 1;
        } else {
            self.truncated = true;
        }
    }

    fn subseparator(&mut self) {
        self.any = true;
        self.commit_sub();
    }

    /// Close the parameter list on sequence dispatch.
    fn finish(&mut self) {
        if !self.any {
            return;
        }
        if self.current_seen || self.sub_counts.get(self.count).copied().unwrap_or(0) == 0 {
            self.commit_sub();
        }
        if self.count < MAX_PARAMS {
            self.count += 1;
        }
    }

    /// Number of parameters (`CSI H` has 0, `CSI ;H` has 2).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// First sub-parameter of parameter `i`, or `None` past the end.
    pub fn get(&self, i: usize) -> Option<u16> {
        (i < self.count).then(|| self.values[i][0])
    }

    /// Sub-parameters of parameter `i` (including the leading value).
    pub fn subparams(&self, i: usize) -> &[u16] {
        if i < self.count {
            &self.values[i][..self.sub_counts[i] as usize]
        } else {
            &[]
        }
    }

    /// Iterate first sub-parameter of every parameter.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.count).map(|i| self.values[i][0])
    }
}

/// A complete accumulated control sequence.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    pub category: Option<FunctionCategory>,
    pub leader: u8,
    intermediates: [u8; 2],
    intermediate_count: u8,
    pub params: Params,
    pub payload: Vec<u8>,
    pub osc_code: u16,
    pub final_byte: u8,
    truncated: bool,
}

impl Sequence {
    fn reset(&mut self) {
        self.category = None;
        self.leader = 0;
        self.intermediates = [0; 2];
        self.intermediate_count = 0;
        self.params.reset();
        self.payload.clear();
        self.osc_code = 0;
        self.final_byte = 0;
        self.truncated = false;
    }

    pub fn intermediates(&self) -> &[u8] {
        &self.intermediates[..self.intermediate_count as usize]
    }

    /// The single intermediate used for function selection.
    fn selector_intermediate(&self) -> u8 {
        self.intermediates.first().copied().unwrap_or(0)
    }

    /// Parameter `i` with `0`/absent mapped to `default`.
    pub fn param_or(&self, i: usize, default: u16) -> u16 {
        match self.params.get(i) {
            Some(0) | None => default,
            Some(v) => v,
        }
    }

    pub fn param_opt(&self, i: usize) -> Option<u16> {
        self.params.get(i)
    }

    pub fn subparam(&self, i: usize, j: usize) -> Option<u16> {
        self.params.subparams(i).get(j).copied()
    }

    pub fn truncated(&self) -> bool {
        self.truncated || self.params.truncated()
    }

    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    fn selector(&self, category: FunctionCategory) -> FunctionSelector {
        FunctionSelector {
            category,
            leader: self.leader,
            intermediate: self.selector_intermediate(),
            final_byte: self.final_byte,
            argc: self.params.len().min(u8::MAX as usize) as u8,
        }
    }
}

/// Receiver of resolved sequences and text batches; implemented by the
/// terminal's executor.
pub trait SequenceHandler {
    /// A batch of printable text (never empty, bounded by the bulk width).
    fn write_text(&mut self, text: &str);
    /// A C0 control in the data stream.
    fn execute_control(&mut self, control: u8);
    /// A resolved control function with its accumulated sequence.
    fn handle(&mut self, function: Function, seq: &Sequence);
}

/// Accumulates parser events into a [`Sequence`], resolves the function
/// via the catalogue, and forwards batched text. Bind a handler with
/// [`SequenceBuilder::bind`] for each parse call.
#[derive(Debug)]
pub struct SequenceBuilder {
    seq: Sequence,
    supported: SupportedSequences,
    text: String,
    text_width: usize,
    max_bulk_text_width: usize,
    /// Set while hooked into a Sixel stream (payload cap differs).
    sixel_hooked: bool,
    dcs_function: Option<Function>,
    in_osc: bool,
}

impl SequenceBuilder {
    pub fn new(level: VtType) -> Self {
        Self {
            seq: Sequence::default(),
            supported: SupportedSequences::new(level),
            text: String::new(),
            text_width: 0,
            max_bulk_text_width: 1024,
            sixel_hooked: false,
            dcs_function: None,
            in_osc: false,
        }
    }

    pub fn supported_sequences(&self) -> &SupportedSequences {
        &self.supported
    }

    pub fn set_conformance(&mut self, level: VtType) {
        self.supported.set_conformance(level);
    }

    /// Cap on one text batch, roughly one screen row of columns.
    pub fn set_max_bulk_text_width(&mut self, width: usize) {
        self.max_bulk_text_width = width.max(1);
    }

    pub fn bind<'a, H: SequenceHandler>(&'a mut self, handler: &'a mut H) -> Bound<'a, H> {
        Bound {
            builder: self,
            handler,
        }
    }
}

/// A [`SequenceBuilder`] bound to its handler for the duration of one parse
/// call; this is what the parser drives.
pub struct Bound<'a, H: SequenceHandler> {
    builder: &'a mut SequenceBuilder,
    handler: &'a mut H,
}

impl<H: SequenceHandler> Bound<'_, H> {
    /// Flush any pending text batch; call at the end of a parse fragment.
    pub fn finish(&mut self) {
        self.flush_text();
    }

    fn flush_text(&mut self) {
        if !self.builder.text.is_empty() {
            self.handler.write_text(&self.builder.text);
            self.builder.text.clear();
            self.builder.text_width = 0;
        }
    }

    fn dispatch(&mut self, category: FunctionCategory) {
        self.builder.seq.params.finish();
        if self.builder.seq.truncated() {
            tracing::debug!("sequence hit parse bounds; dispatching the accepted prefix");
        }
        let selector = self.builder.seq.selector(category);
        match self.builder.supported.select(selector) {
            Some(def) => {
                self.builder.seq.category = Some(category);
                self.handler.handle(def.id, &self.builder.seq);
            }
            None if self.builder.supported.is_disabled(selector) => {
                tracing::debug!(
                    final_byte = selector.final_byte as char as u32,
                    level = ?self.builder.supported.level(),
                    "sequence above conformance level, ignored"
                );
            }
            None => {
                tracing::debug!(
                    category = ?category,
                    leader = selector.leader,
                    intermediate = selector.intermediate,
                    final_byte = selector.final_byte,
                    "unknown sequence, ignored"
                );
            }
        }
    }
}

impl<H: SequenceHandler> Perform for Bound<'_, H> {
    fn print(&mut self, c: char) {
        use unicode_width::UnicodeWidthChar;
        self.builder.text.push(c);
        self.builder.text_width += UnicodeWidthChar::width(c).unwrap_or(0);
        if self.builder.text_width >= self.builder.max_bulk_text_width {
            self.flush_text();
        }
    }

    fn execute(&mut self, control: u8) {
        self.flush_text();
        self.handler.execute_control(control);
    }

    fn clear(&mut self) {
        self.flush_text();
        self.builder.seq.reset();
        self.builder.sixel_hooked = false;
        self.builder.dcs_function = None;
        self.builder.in_osc = false;
    }

    fn collect_leader(&mut self, byte: u8) {
        self.builder.seq.leader = byte;
    }

    fn collect_intermediate(&mut self, byte: u8) {
        let seq = &mut self.builder.seq;
        if (seq.intermediate_count as usize) < seq.intermediates.len() {
            seq.intermediates[seq.intermediate_count as usize] = byte;
            seq.intermediate_count += 1;
        } else {
            seq.truncated = true;
        }
    }

    fn param_digit(&mut self, digit: u8) {
        self.builder.seq.params.digit(digit);
    }

    fn param_separator(&mut self) {
        self.builder.seq.params.separator();
    }

    fn param_subseparator(&mut self) {
        self.builder.seq.params.subseparator();
    }

    fn esc_dispatch(&mut self, final_byte: u8) {
        self.flush_text();
        self.builder.seq.final_byte = final_byte;
        self.dispatch(FunctionCategory::Esc);
    }

    fn csi_dispatch(&mut self, final_byte: u8) {
        self.flush_text();
        self.builder.seq.final_byte = final_byte;
        self.dispatch(FunctionCategory::Csi);
    }

    fn osc_start(&mut self) {
        self.flush_text();
        self.builder.seq.reset();
        self.builder.in_osc = true;
    }

    fn osc_put(&mut self, byte: u8) {
        let seq = &mut self.builder.seq;
        if seq.payload.len() < MAX_PAYLOAD {
            seq.payload.push(byte);
        } else {
            seq.truncated = true;
        }
    }

    fn osc_end(&mut self) {
        if !self.builder.in_osc {
            return;
        }
        self.builder.in_osc = false;

        // Split the numeric code off the payload.
        let payload = std::mem::take(&mut self.builder.seq.payload);
        let code_end = payload
            .iter()
            .position(|&b| b == b';')
            .unwrap_or(payload.len());
        let code: u16 = match std::str::from_utf8(&payload[..code_end])
            .ok()
            .and_then(|s| s.parse().ok())
        {
            Some(code) => code,
            None => {
                tracing::debug!("OSC without numeric code, ignored");
                return;
            }
        };
        self.builder.seq.osc_code = code;
        self.builder.seq.payload = if code_end < payload.len() {
            payload[code_end + 1..].to_vec()
        } else {
            Vec::new()
        };
        self.builder.seq.category = Some(FunctionCategory::Osc);

        match self.builder.supported.select_osc(code) {
            Some(function) => self.handler.handle(function, &self.builder.seq),
            None => tracing::debug!(code, "unknown OSC, ignored"),
        }
    }

    fn dcs_hook(&mut self, final_byte: u8) {
        self.flush_text();
        self.builder.seq.final_byte = final_byte;
        self.builder.seq.params.finish();
        let selector = self.builder.seq.selector(FunctionCategory::Dcs);
        match self.builder.supported.select(selector) {
            Some(def) => {
                self.builder.dcs_function = Some(def.id);
                self.builder.sixel_hooked = def.id == Function::DecSixel;
            }
            None => {
                tracing::debug!(final_byte, "unknown DCS hook, payload discarded");
                self.builder.dcs_function = None;
                self.builder.sixel_hooked = false;
            }
        }
    }

    fn dcs_put(&mut self, byte: u8) {
        if self.builder.dcs_function.is_none() {
            return;
        }
        let cap = if self.builder.sixel_hooked {
            MAX_SIXEL_PAYLOAD
        } else {
            MAX_PAYLOAD
        };
        let seq = &mut self.builder.seq;
        if seq.payload.len() < cap {
            seq.payload.push(byte);
        } else {
            seq.truncated = true;
        }
    }

    fn dcs_unhook(&mut self) {
        if let Some(function) = self.builder.dcs_function.take() {
            self.builder.seq.category = Some(FunctionCategory::Dcs);
            // The borrow of seq ends before reset on the next clear().
            self.handler.handle(function, &self.builder.seq);
        }
        self.builder.sixel_hooked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[derive(Default)]
    struct Capture {
        text: Vec<String>,
        controls: Vec<u8>,
        handled: Vec<(Function, Vec<Vec<u16>>, Vec<u8>, u16)>,
    }

    impl SequenceHandler for Capture {
        fn write_text(&mut self, text: &str) {
            self.text.push(text.to_string());
        }
        fn execute_control(&mut self, control: u8) {
            self.controls.push(control);
        }
        fn handle(&mut self, function: Function, seq: &Sequence) {
            let params = (0..seq.params.len())
                .map(|i| seq.params.subparams(i).to_vec())
                .collect();
            self.handled
                .push((function, params, seq.payload.clone(), seq.osc_code));
        }
    }

    fn feed(bytes: &[u8]) -> Capture {
        let mut parser = Parser::new();
        let mut builder = SequenceBuilder::new(VtType::VT525);
        let mut capture = Capture::default();
        let mut bound = builder.bind(&mut capture);
        parser.advance(&mut bound, bytes);
        bound.finish();
        capture
    }

    #[test]
    fn text_batches_flush_before_controls() {
        let capture = feed(b"hello\nworld");
        assert_eq!(capture.text, vec!["hello".to_string(), "world".to_string()]);
        assert_eq!(capture.controls, vec![b'\n']);
    }

    #[test]
    fn csi_params_resolve_to_function() {
        let capture = feed(b"\x1b[5;7H");
        let (function, params, _, _) = &capture.handled[0];
        assert_eq!(*function, Function::Cup);
        assert_eq!(params, &vec![vec![5], vec![7]]);
    }

    #[test]
    fn empty_params_count_as_defaults() {
        let capture = feed(b"\x1b[;5H");
        let (_, params, _, _) = &capture.handled[0];
        assert_eq!(params, &vec![vec![0], vec![5]]);
        // No params at all yields an empty list.
        let capture = feed(b"\x1b[H");
        let (_, params, _, _) = &capture.handled[0];
        assert!(params.is_empty());
    }

    #[test]
    fn subparameters_stay_grouped() {
        let capture = feed(b"\x1b[38:2:10:20:30m");
        let (function, params, _, _) = &capture.handled[0];
        assert_eq!(*function, Function::Sgr);
        assert_eq!(params, &vec![vec![38, 2, 10, 20, 30]]);
    }

    #[test]
    fn dec_private_mode_resolves() {
        let capture = feed(b"\x1b[?1049h");
        let (function, params, _, _) = &capture.handled[0];
        assert_eq!(*function, Function::DecSm);
        assert_eq!(params, &vec![vec![1049]]);
    }

    #[test]
    fn osc_splits_code_from_payload() {
        let capture = feed(b"\x1b]0;my title\x07");
        let (function, _, payload, code) = &capture.handled[0];
        assert_eq!(*function, Function::SetTitle);
        assert_eq!(*code, 0);
        assert_eq!(payload, b"my title");
    }

    #[test]
    fn dcs_payload_dispatches_at_unhook() {
        let capture = feed(b"\x1bP$qm\x1b\\");
        let (function, _, payload, _) = &capture.handled[0];
        assert_eq!(*function, Function::DecRqss);
        assert_eq!(payload, b"m");
    }

    #[test]
    fn oversized_osc_payload_truncates() {
        let mut input = b"\x1b]0;".to_vec();
        input.extend(std::iter::repeat(b'x').take(MAX_PAYLOAD + 100));
        input.push(0x07);
        let capture = feed(&input);
        let (_, _, payload, _) = &capture.handled[0];
        // Code and separator count toward the cap; the tail is dropped.
        assert!(payload.len() <= MAX_PAYLOAD);
        assert!(payload.len() > MAX_PAYLOAD / 2);
    }

    #[test]
    fn param_overflow_truncates_but_dispatches() {
        let mut input = b"\x1b[".to_vec();
        for i in 0..30 {
            if i > 0 {
                input.push(b';');
            }
            input.push(b'1');
        }
        input.push(b'm');
        let capture = feed(&input);
        let (function, params, _, _) = &capture.handled[0];
        assert_eq!(*function, Function::Sgr);
        assert_eq!(params.len(), MAX_PARAMS);
    }

    #[test]
    fn bulk_text_width_caps_batches() {
        let mut parser = Parser::new();
        let mut builder = SequenceBuilder::new(VtType::VT525);
        builder.set_max_bulk_text_width(4);
        let mut capture = Capture::default();
        let mut bound = builder.bind(&mut capture);
        parser.advance(&mut bound, b"abcdefghij");
        bound.finish();
        assert_eq!(capture.text, vec!["abcd", "efgh", "ij"]);
    }
}
