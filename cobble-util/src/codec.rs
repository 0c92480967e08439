use std::io::{Read, Write};

/// Wire strings are always this many bytes, right-padded with ASCII space.
pub const STRING_LENGTH: usize = 64;
/// Wire byte arrays are always this many bytes, right-padded with NUL.
pub const ARRAY_LENGTH: usize = 1024;

pub trait WriteExtPacket {
    fn write_u8(&mut self, value: u8) -> std::io::Result<()>;
    fn write_i8(&mut self, value: i8) -> std::io::Result<()>;
    fn write_i16(&mut self, value: i16) -> std::io::Result<()>;
    fn write_string(&mut self, string: &str) -> std::io::Result<()>;
    fn write_array(&mut self, array: &[u8]) -> std::io::Result<()>;
}

impl<T: Write> WriteExtPacket for T {
    fn write_u8(&mut self, value: u8) -> std::io::Result<()> {
        self.write_all(&[value])
    }

    fn write_i8(&mut self, value: i8) -> std::io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    fn write_i16(&mut self, value: i16) -> std::io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    fn write_string(&mut self, string: &str) -> std::io::Result<()> {
        let mut buf = [0x20u8; STRING_LENGTH];
        let bytes = string.as_bytes();
        let len = bytes.len().min(STRING_LENGTH);
        buf[..len].copy_from_slice(&bytes[..len]);
        self.write_all(&buf)
    }

    fn write_array(&mut self, array: &[u8]) -> std::io::Result<()> {
        let mut buf = [0u8; ARRAY_LENGTH];
        let len = array.len().min(ARRAY_LENGTH);
        buf[..len].copy_from_slice(&array[..len]);
        self.write_all(&buf)
    }
}

pub trait ReadExtPacket {
    fn read_u8(&mut self) -> std::io::Result<u8>;
    fn read_i8(&mut self) -> std::io::Result<i8>;
    fn read_i16(&mut self) -> std::io::Result<i16>;
    /// Reads a full 64-byte field and trims trailing padding spaces.
    /// Invalid UTF-8 is replaced rather than rejected; legacy clients send
    /// CP437-ish bytes and a chat message must never kill the parse.
    fn read_string(&mut self) -> std::io::Result<String>;
    fn read_array(&mut self) -> std::io::Result<Box<[u8]>>;
}

impl<T: Read> ReadExtPacket for T {
    fn read_u8(&mut self) -> std::io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_i8(&mut self) -> std::io::Result<i8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(i8::from_be_bytes(buf))
    }

    fn read_i16(&mut self) -> std::io::Result<i16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }

    fn read_string(&mut self) -> std::io::Result<String> {
        let mut buf = [0u8; STRING_LENGTH];
        self.read_exact(&mut buf)?;
        let end = buf
            .iter()
            .rposition(|&b| b != 0x20)
            .map(|i| i + 1)
            .unwrap_or(0);
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    fn read_array(&mut self) -> std::io::Result<Box<[u8]>> {
        let mut buf = vec![0u8; ARRAY_LENGTH].into_boxed_slice();
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}
