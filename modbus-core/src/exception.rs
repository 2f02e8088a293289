//! Modbus exception codes and exception-PDU framing.

/// Modbus exception code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// Unknown or unsupported function code.
    IllegalFunction,
    /// Referenced address is not mapped.
    IllegalDataAddress,
    /// Quantity out of range, or a write targets a read-only mapping.
    IllegalDataValue,
    /// Downstream or registry failure while servicing the request.
    SlaveDeviceFailure,
}

impl ExceptionCode {
    /// The wire exception code byte.
    pub fn as_u8(&self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::SlaveDeviceFailure => 0x04,
        }
    }
}

/// Build an exception response PDU: function code with the high bit set,
/// followed by the exception byte.
pub fn build_exception_pdu(function_code: u8, exception: ExceptionCode) -> Vec<u8> {
    vec![function_code | 0x80, exception.as_u8()]
}

/// True if a PDU's leading byte marks it as an exception response.
pub fn is_exception_pdu(pdu: &[u8]) -> bool {
    pdu.first().is_some_and(|&fc| fc & 0x80 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_pdu_sets_high_bit() {
        let pdu = build_exception_pdu(0x03, ExceptionCode::IllegalDataValue);
        assert_eq!(pdu, vec![0x83, 0x03]);
        assert!(is_exception_pdu(&pdu));
    }
}
