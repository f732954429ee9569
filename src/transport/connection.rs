use std::fs;

use redis::cluster::{ClusterClient, ClusterConnection};
use redis::{Client, ClientTlsConfig, Connection, TlsCertificates};

use crate::config::ConnectionOptions;
use crate::error::{ClientError, Result};
use crate::reply::Reply;
use crate::transport::Transport;

enum Conn {
    Single(Connection),
    Cluster(ClusterConnection),
}

/// Blocking connection to a Redis server or cluster.
pub struct RedisTransport {
    conn: Conn,
}

impl RedisTransport {
    pub fn connect(options: &ConnectionOptions) -> Result<Self> {
        let conn = if options.cluster {
            Conn::Cluster(connect_cluster(options)?)
        } else {
            Conn::Single(connect_single(options)?)
        };
        Ok(Self { conn })
    }
}

impl Transport for RedisTransport {
    fn send_command(&mut self, name: &str, args: &[String]) -> Result<Reply> {
        tracing::trace!(command = name, args = args.len(), "sending command");

        let mut cmd = redis::cmd(name);
        for arg in args {
            cmd.arg(arg);
        }
        let value: redis::Value = match &mut self.conn {
            Conn::Single(conn) => cmd.query(conn)?,
            Conn::Cluster(conn) => cmd.query(conn)?,
        };
        Ok(Reply::from(value))
    }

    fn is_cluster(&self) -> bool {
        matches!(self.conn, Conn::Cluster(_))
    }
}

fn connect_single(options: &ConnectionOptions) -> Result<Connection> {
    let mut conn = build_client(options)?.get_connection()?;

    if let Some(password) = &options.password {
        let mut auth = redis::cmd("AUTH");
        if let Some(user) = options.username.as_deref().filter(|u| !u.is_empty()) {
            auth.arg(user);
        }
        auth.arg(password).query::<()>(&mut conn)?;
    }
    if options.db != 0 {
        redis::cmd("SELECT")
            .arg(options.db)
            .query::<()>(&mut conn)?;
    }

    tracing::debug!(endpoint = %options.endpoint(), db = options.db, "connected");
    Ok(conn)
}

/// Client for a single node. No connection is made yet.
fn build_client(options: &ConnectionOptions) -> Result<Client> {
    let url = connection_url(options);
    let client = match tls_certificates(options)? {
        Some(certs) => Client::build_with_tls(url.as_str(), certs)?,
        None => Client::open(url.as_str())?,
    };
    Ok(client)
}

fn connect_cluster(options: &ConnectionOptions) -> Result<ClusterConnection> {
    if options.cert.is_some() || options.key.is_some() || options.cacert.is_some() {
        return Err(ClientError::usage("certificate files are not supported in cluster mode"));
    }
    if options.db != 0 {
        return Err(ClientError::usage("cluster mode only supports database 0"));
    }

    let mut builder = ClusterClient::builder(vec![connection_url(options)]);
    if let Some(user) = &options.username {
        builder = builder.username(user.clone());
    }
    if let Some(password) = &options.password {
        builder = builder.password(password.clone());
    }
    let conn = builder.build()?.get_connection()?;

    tracing::debug!(endpoint = %options.endpoint(), "connected to cluster");
    Ok(conn)
}

/// URL without credentials. Without a CA file the server certificate is not
/// verified.
fn connection_url(options: &ConnectionOptions) -> String {
    if let Some(uri) = &options.uri {
        return uri.clone();
    }
    if options.wants_tls() {
        let fragment = match options.cacert {
            Some(_) => "",
            None => "#insecure",
        };
        format!("rediss://{}:{}/{}", options.host, options.port, fragment)
    } else {
        format!("redis://{}:{}/", options.host, options.port)
    }
}

fn tls_certificates(options: &ConnectionOptions) -> Result<Option<TlsCertificates>> {
    let client_tls = match (&options.cert, &options.key) {
        (None, None) => None,
        (Some(cert), Some(key)) => Some(ClientTlsConfig {
            client_cert: fs::read(cert)?,
            client_key: fs::read(key)?,
        }),
        _ => return Err(ClientError::usage("--cert and --key must be given together")),
    };
    let root_cert = options.cacert.as_ref().map(fs::read).transpose()?;

    if client_tls.is_none() && root_cert.is_none() {
        return Ok(None);
    }
    Ok(Some(TlsCertificates {
        client_tls,
        root_cert,
    }))
}
