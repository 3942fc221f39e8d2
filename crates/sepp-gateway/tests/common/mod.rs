//! Shared fixtures: a throwaway PKI and gateway configurations.

#![allow(dead_code)]

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use sepp_kernel::settings::{Listener, N32Listener, SeppConfig, TlsFiles};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// A CA plus helpers to issue leaf certificates into a temp directory.
pub struct Pki {
    pub dir: TempDir,
    ca_cert: Certificate,
    ca_key: KeyPair,
    ca_path: String,
}

impl Pki {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();

        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = params.self_signed(&ca_key).unwrap();

        let ca_path = write(dir.path(), "ca.crt", &ca_cert.pem());
        Self {
            dir,
            ca_cert,
            ca_key,
            ca_path,
        }
    }

    /// Leaf for `localhost` usable as both server and client identity.
    pub fn issue(&self, name: &str) -> TlsFiles {
        let mut params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .unwrap();
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();

        TlsFiles {
            cert: write(self.dir.path(), &format!("{name}.crt"), &cert.pem()),
            key: write(self.dir.path(), &format!("{name}.key"), &key.serialize_pem()),
            ca: self.ca_path.clone(),
        }
    }

    /// Leaf signed by a different CA, so peers must refuse it.
    pub fn issue_untrusted(&self, name: &str) -> TlsFiles {
        let other = Pki::new();
        let mut files = other.issue(name);
        for path in [&mut files.cert, &mut files.key] {
            let target = self.dir.path().join(Path::new(path.as_str()).file_name().unwrap());
            std::fs::copy(&*path, &target).unwrap();
            *path = target.display().to_string();
        }
        files.ca = self.ca_path.clone();
        files
    }
}

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.display().to_string()
}

/// A port nobody is listening on right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Gateway on 127.0.0.1 with fresh N32 and SBI ports.
pub fn gateway_config(fqdn: &str, tls: &TlsFiles, remote: Option<u16>) -> SeppConfig {
    let mut config = SeppConfig::default();
    config.sepp.local.n32 = N32Listener {
        fqdn: fqdn.to_string(),
        host: "127.0.0.1".to_string(),
        port: free_port(),
        tls: tls.clone(),
    };
    config.sepp.local.sbi = Listener {
        host: "127.0.0.1".to_string(),
        port: free_port(),
        tls: tls.clone(),
    };
    if let Some(port) = remote {
        config.sepp.remote.url = format!("https://localhost:{port}");
        config.sepp.remote.tls = tls.clone();
    }
    config.sepp.handshake.retry_interval_secs = 1;
    config.sepp.shutdown_grace_secs = 2;
    config
}

/// Wait until something accepts TCP connections on `addr`.
pub async fn wait_listening(addr: SocketAddr) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on {addr}");
}

pub fn local(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub async fn within<T>(what: &str, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}
