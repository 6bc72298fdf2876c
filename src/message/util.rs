use std::io::{self, prelude::*};

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
///
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Read a usize out of the given stream.
///
pub fn read_usize<R: Read>(stream: &mut R) -> io::Result<usize> {
    Ok(usize::from_le_bytes(read_bytes_array(stream)?))
}

/// Read the given number of bytes from a stream, into a vec.
///
pub fn read_bytes_vec<R: Read>(stream: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; size];
    stream.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Read the given (const) number of bytes from a stream, into an array.
///
pub fn read_bytes_array<R: Read, const SIZE: usize>(stream: &mut R) -> io::Result<[u8; SIZE]> {
    let mut buffer = [0; SIZE];
    stream.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Write a length-prefixed frame and wait for the peer to acknowledge it
/// with the number of bytes it read.
///
pub fn write_frame_acked<S: Read + Write>(stream: &mut S, frame: &[u8]) -> io::Result<()> {
    stream.write_all(&frame.len().to_le_bytes())?;
    stream.write_all(frame)?;
    let ack = read_usize(stream)?;

    if ack != frame.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("receiver acked {} bytes, {} were sent", ack, frame.len()),
        ));
    }
    Ok(())
}
