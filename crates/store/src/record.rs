use bytes::Bytes;

/// Documento persistido: chave única, blob de valor e expiração opcional
/// (epoch em segundos fracionários). `None` = nunca expira.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: Bytes,
    pub expires_at: Option<f64>,
}

impl Record {
    pub fn new(key: String, value: Bytes, expires_at: Option<f64>) -> Self {
        Self {
            key,
            value,
            expires_at,
        }
    }

    /// Predicado único de expiração lógica, compartilhado entre o caminho
    /// de leitura e a varredura do pruner.
    pub fn is_expired_at(&self, now: f64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_expiration_never_expires() {
        let rec = Record::new("k".into(), Bytes::from("v"), None);
        assert!(!rec.is_expired_at(f64::MAX));
    }

    #[test]
    fn expired_when_past() {
        let rec = Record::new("k".into(), Bytes::from("v"), Some(100.0));
        assert!(rec.is_expired_at(100.5));
        assert!(!rec.is_expired_at(99.9));
    }

    #[test]
    fn expired_at_exact_instant() {
        // exp <= now: no instante exato já conta como expirado
        let rec = Record::new("k".into(), Bytes::from("v"), Some(100.0));
        assert!(rec.is_expired_at(100.0));
    }
}
