/// Total size of the canonical SNIP data buffer.
pub const SNIP_BUFFER_LEN: usize = 253;

const FIELD_MAX_LEN: [usize; 6] = [40, 40, 20, 20, 62, 63];

/// Simple Node Identification Protocol record.
///
/// Holds six human-readable identity strings plus the 253-byte canonical
/// buffer they're serialized into: version byte `4`, four null-terminated
/// strings (manufacturer, model, hardware version, software version), then
/// version byte `2`, then two more null-terminated strings (user-provided
/// name, user-provided description).
///
/// A SNIP is write-once per link session: when a peer restarts, or when a
/// `Simple_Node_Ident_Info_Request` targets us, the buffer is reset and
/// strings are re-accumulated from scratch via [`Snip::add_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snip {
    pub manufacturer_name: String,
    pub model_name: String,
    pub hardware_version: String,
    pub software_version: String,
    pub user_provided_name: String,
    pub user_provided_description: String,
    data: [u8; SNIP_BUFFER_LEN],
    index: usize,
}

impl Default for Snip {
    fn default() -> Self {
        let mut snip = Self {
            manufacturer_name: String::new(),
            model_name: String::new(),
            hardware_version: String::new(),
            software_version: String::new(),
            user_provided_name: String::new(),
            user_provided_description: String::new(),
            data: [0u8; SNIP_BUFFER_LEN],
            index: 0,
        };
        snip.update_data_from_strings();
        snip
    }
}

impl Snip {
    pub fn new(
        manufacturer_name: impl Into<String>,
        model_name: impl Into<String>,
        hardware_version: impl Into<String>,
        software_version: impl Into<String>,
        user_provided_name: impl Into<String>,
        user_provided_description: impl Into<String>,
    ) -> Self {
        let mut snip = Self {
            manufacturer_name: manufacturer_name.into(),
            model_name: model_name.into(),
            hardware_version: hardware_version.into(),
            software_version: software_version.into(),
            user_provided_name: user_provided_name.into(),
            user_provided_description: user_provided_description.into(),
            data: [0u8; SNIP_BUFFER_LEN],
            index: 0,
        };
        snip.update_data_from_strings();
        snip
    }

    /// Serialize the six strings into the canonical 253-byte buffer,
    /// truncating each to its field maximum and dropping non-ASCII bytes
    /// beyond the 7-bit range (OpenLCB SNIP strings are specified as
    /// NUL-terminated byte strings; truncation here only ever cuts at a
    /// byte boundary, so callers that need whole-code-point-safe
    /// truncation should pre-truncate their UTF-8 strings themselves).
    pub fn update_data_from_strings(&mut self) {
        self.data = [0u8; SNIP_BUFFER_LEN];
        self.index = 1;
        self.data[0] = 4;

        self.write_field(&self.manufacturer_name.clone(), FIELD_MAX_LEN[0]);
        self.write_field(&self.model_name.clone(), FIELD_MAX_LEN[1]);
        self.write_field(&self.hardware_version.clone(), FIELD_MAX_LEN[2]);
        self.write_field(&self.software_version.clone(), FIELD_MAX_LEN[3]);

        self.data[self.index] = 2;
        self.index += 1;

        self.write_field(&self.user_provided_name.clone(), FIELD_MAX_LEN[4]);
        self.write_field(&self.user_provided_description.clone(), FIELD_MAX_LEN[5]);
    }

    fn write_field(&mut self, value: &str, max_len: usize) {
        let bytes = value.as_bytes();
        let n = bytes.len().min(max_len);
        self.data[self.index..self.index + n].copy_from_slice(&bytes[..n]);
        self.index += n;
        self.data[self.index] = 0;
        self.index += 1;
    }

    /// Append additional bytes received in a `Simple_Node_Ident_Info_Reply`
    /// and re-derive the six strings. Bytes beyond the buffer are dropped
    /// with a logged warning, matching the reference implementation's
    /// overlapping-request guard.
    pub fn add_data(&mut self, incoming: &[u8]) {
        for (i, &b) in incoming.iter().enumerate() {
            if self.index + i >= SNIP_BUFFER_LEN {
                log::error!("overlapping SNIP reply data, truncating");
                break;
            }
            self.data[self.index + i] = b;
        }
        self.index = (self.index + incoming.len()).min(SNIP_BUFFER_LEN);
        self.update_strings_from_data();
    }

    /// Re-derive the six strings from the current buffer contents.
    pub fn update_strings_from_data(&mut self) {
        self.manufacturer_name = self.string_n(0);
        self.model_name = self.string_n(1);
        self.hardware_version = self.string_n(2);
        self.software_version = self.string_n(3);
        self.user_provided_name = self.string_n(4);
        self.user_provided_description = self.string_n(5);
    }

    /// Find the start offset of the nth (0-based) string in the buffer, or
    /// `None` if it isn't present yet.
    fn find_string_start(&self, n: usize) -> Option<usize> {
        if n == 0 {
            return Some(1);
        }
        let mut start = 1usize;
        let mut count = 0usize;
        for i in 1..SNIP_BUFFER_LEN.saturating_sub(1) {
            if self.data[i] == 0 {
                if count == n {
                    return Some(start);
                }
                start = i + 1;
                count += 1;
                if count == 4 {
                    // skip the second version byte
                    start += 1;
                }
            }
        }
        None
    }

    fn string_n(&self, n: usize) -> String {
        let Some(start) = self.find_string_start(n) else {
            return String::new();
        };
        let max_len = FIELD_MAX_LEN[n] + 1; // include room to find the terminator
        let mut end = start;
        while end < start + max_len && end < SNIP_BUFFER_LEN && self.data[end] != 0 {
            end += 1;
        }
        String::from_utf8_lossy(&self.data[start..end]).into_owned()
    }

    /// Return the canonical buffer bytes up through the terminator of the
    /// sixth string (the user-provided description), which is what a
    /// `Simple_Node_Ident_Info_Reply` sends on the wire.
    pub fn to_reply_bytes(&self) -> Vec<u8> {
        match self.find_string_start(6) {
            Some(stop) => self.data[..stop].to_vec(),
            None => self.data.to_vec(),
        }
    }

    /// Raw buffer contents, e.g. for persisting or inspecting accumulation
    /// progress.
    pub fn raw_buffer(&self) -> &[u8; SNIP_BUFFER_LEN] {
        &self.data
    }

    /// Clear the buffer and all six strings, and rewind the accumulation
    /// cursor to the start of the buffer.
    ///
    /// Called before a fresh `Simple_Node_Ident_Info_Reply` sequence is
    /// expected: either because a peer just restarted, or because a
    /// `Simple_Node_Ident_Info_Request` was just directed at the node being
    /// tracked. Unlike [`Snip::default`], this leaves the cursor at offset
    /// `0` so the next [`Snip::add_data`] call writes the incoming reply's
    /// version byte at the start of the buffer, not after a blank-string
    /// encoding of it.
    pub fn clear_for_refresh(&mut self) {
        self.data = [0u8; SNIP_BUFFER_LEN];
        self.index = 0;
        self.manufacturer_name.clear();
        self.model_name.clear();
        self.hardware_version.clear();
        self.software_version.clear();
        self.user_provided_name.clear();
        self.user_provided_description.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_round_trip_through_data() {
        let mut snip = Snip::new("Acme", "Widget", "1.0", "2.0", "My Node", "A description");
        snip.update_strings_from_data();
        assert_eq!(snip.manufacturer_name, "Acme");
        assert_eq!(snip.model_name, "Widget");
        assert_eq!(snip.hardware_version, "1.0");
        assert_eq!(snip.software_version, "2.0");
        assert_eq!(snip.user_provided_name, "My Node");
        assert_eq!(snip.user_provided_description, "A description");
    }

    #[test]
    fn empty_fields_round_trip() {
        let mut snip = Snip::default();
        snip.update_strings_from_data();
        assert_eq!(snip.manufacturer_name, "");
        assert_eq!(snip.user_provided_description, "");
    }

    #[test]
    fn add_data_accumulates_across_calls() {
        let source = Snip::new("Acme", "Widget", "1.0", "2.0", "My Node", "desc");
        let full = source.to_reply_bytes();

        let mut target = Snip::default();
        target.clear_for_refresh();
        // split the reply into two arbitrary chunks, as two reply messages would
        let mid = full.len() / 2;
        target.add_data(&full[..mid]);
        target.add_data(&full[mid..]);

        assert_eq!(target.manufacturer_name, "Acme");
        assert_eq!(target.user_provided_description, "desc");
    }

    #[test]
    fn reply_bytes_stop_at_sixth_terminator() {
        let snip = Snip::new("A", "B", "C", "D", "E", "F");
        let bytes = snip.to_reply_bytes();
        assert_eq!(*bytes.last().unwrap(), 0);
    }
}
