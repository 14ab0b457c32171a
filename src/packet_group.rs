use bytes::Bytes;

/// A group of packets that is sent as a unit: `2 * N` buffers, alternating header and payload.
///
/// The content of packets is irrelevant for the benchmark, so all slots share the same header
///  and the same payload buffer. [Bytes] is reference counted, so building a group allocates the
///  header and payload once, regardless of the number of packets.
#[derive(Debug, Clone)]
pub struct PacketGroup {
    buffers: Vec<Bytes>,
    packet_len: usize,
}

impl PacketGroup {
    /// Creates a group of `num_packets` zeroed packets
    pub fn new(num_packets: usize, header_size: usize, payload_size: usize) -> PacketGroup {
        Self::from_parts(
            Bytes::from(vec![0u8; header_size]),
            Bytes::from(vec![0u8; payload_size]),
            num_packets,
        )
    }

    /// Creates a group from given header and payload buffers, which are shared by all packets
    pub fn from_parts(header: Bytes, payload: Bytes, num_packets: usize) -> PacketGroup {
        let packet_len = header.len() + payload.len();

        let mut buffers = Vec::with_capacity(2 * num_packets);
        for _ in 0..num_packets {
            buffers.push(header.clone());
            buffers.push(payload.clone());
        }

        PacketGroup { buffers, packet_len }
    }

    /// number of buffers, i.e. twice the number of packets
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn num_packets(&self) -> usize {
        self.buffers.len() / 2
    }

    /// total number of bytes in the group
    pub fn total_len(&self) -> usize {
        self.num_packets() * self.packet_len
    }

    pub fn buffers(&self) -> &[Bytes] {
        &self.buffers
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.buffers.iter().map(|b| b.as_ref())
    }
}
