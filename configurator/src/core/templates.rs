//! Static configuration templates and the context they are rendered with
//!
//! Templates use `{{key}}` placeholders. Each template declares the keys it
//! needs so a run can validate its [TemplateContext] before touching any node.

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::error::{BootstrapError, BootstrapResult};

/// Context key holding the master's private address
pub const MASTER_KEY: &str = "master";

/// Port the coordination service listens on
pub const COORDINATION_CLIENT_PORT: u16 = 2181;

/// Immutable key/value map shared by every per-node render of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a cluster whose master has the given private address
    pub fn for_master(address: IpAddr) -> Self {
        Self::new().with(MASTER_KEY, address.to_string())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// A named configuration file body with its required context keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    pub body: &'static str,
    pub required_keys: &'static [&'static str],
}

impl Template {
    /// Check that `context` provides every key this template needs
    pub fn validate(&self, context: &TemplateContext) -> BootstrapResult<()> {
        for key in self.required_keys {
            if context.get(key).is_none() {
                return Err(BootstrapError::MissingTemplateKey {
                    template: self.name.to_string(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Substitute every placeholder from `context`
    pub fn render(&self, context: &TemplateContext) -> BootstrapResult<String> {
        self.validate(context)?;

        let mut rendered = String::with_capacity(self.body.len());
        let mut rest = self.body;
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let key = rest[start + 2..start + 2 + len].trim();
            let value = context
                .get(key)
                .ok_or_else(|| BootstrapError::MissingTemplateKey {
                    template: self.name.to_string(),
                    key: key.to_string(),
                })?;

            rendered.push_str(&rest[..start]);
            rendered.push_str(value);
            rest = &rest[start + 2 + len + 2..];
        }
        rendered.push_str(rest);

        Ok(rendered)
    }

    /// Placeholder keys referenced by the body, in order of appearance
    pub fn placeholders(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        let mut rest = self.body;
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            keys.push(rest[start + 2..start + 2 + len].trim());
            rest = &rest[start + 2 + len + 2..];
        }
        keys
    }
}

/// Read back the `<value>` of a `<property>` in a rendered site document
pub fn property_value(document: &str, name: &str) -> Option<String> {
    let needle = format!("<name>{name}</name>");
    let mut rest = document;
    while let Some(open) = rest.find("<property>") {
        let body_start = open + "<property>".len();
        let close = rest[body_start..].find("</property>")? + body_start;
        let property = &rest[body_start..close];
        if property.contains(&needle) {
            let value_start = property.find("<value>")? + "<value>".len();
            let value_end = property[value_start..].find("</value>")? + value_start;
            return Some(property[value_start..value_end].to_string());
        }
        rest = &rest[close + "</property>".len()..];
    }
    None
}

/// Coordination service (ZooKeeper) configuration, written on the master only
pub const ZOO_CFG: Template = Template {
    name: "zoo.cfg",
    body: r#"tickTime=2000
dataDir=/var/lib/zookeeper
clientPort=2181
maxClientCnxns=100
"#,
    required_keys: &[],
};

/// Shell-sourceable Accumulo environment
pub const ACCUMULO_ENV: Template = Template {
    name: "accumulo-env.sh",
    body: r#"test -z "$JAVA_HOME"             && export JAVA_HOME=/usr/lib/jvm/java-6-sun/jre
test -z "$HADOOP_HOME"           && export HADOOP_HOME=/opt/hadoop
test -z "$ZOOKEEPER_HOME"        && export ZOOKEEPER_HOME=/opt/zookeeper
test -z "$ACCUMULO_LOG_DIR"      && export ACCUMULO_LOG_DIR=$ACCUMULO_HOME/logs
if [ -f ${ACCUMULO_HOME}/conf/accumulo.policy ]
then
   POLICY="-Djava.security.manager -Djava.security.policy=${ACCUMULO_HOME}/conf/accumulo.policy"
fi
test -z "$ACCUMULO_TSERVER_OPTS" && export ACCUMULO_TSERVER_OPTS="${POLICY} -Xmx384m -Xms384m "
test -z "$ACCUMULO_MASTER_OPTS"  && export ACCUMULO_MASTER_OPTS="${POLICY} -Xmx128m -Xms128m"
test -z "$ACCUMULO_MONITOR_OPTS" && export ACCUMULO_MONITOR_OPTS="${POLICY} -Xmx64m -Xms64m"
test -z "$ACCUMULO_GC_OPTS"      && export ACCUMULO_GC_OPTS="-Xmx64m -Xms64m"
test -z "$ACCUMULO_LOGGER_OPTS"  && export ACCUMULO_LOGGER_OPTS="-Xmx384m -Xms256m"
test -z "$ACCUMULO_GENERAL_OPTS" && export ACCUMULO_GENERAL_OPTS="-XX:+UseConcMarkSweepGC -XX:CMSInitiatingOccupancyFraction=75"
test -z "$ACCUMULO_OTHER_OPTS"   && export ACCUMULO_OTHER_OPTS="-Xmx128m -Xms64m"
export ACCUMULO_LOG_HOST=`(grep -v '^#' $ACCUMULO_HOME/conf/masters ; echo localhost ) 2>/dev/null | head -1`
"#,
    required_keys: &[],
};

/// Accumulo site configuration; `instance.zookeeper.host` points at the master
pub const ACCUMULO_SITE: Template = Template {
    name: "accumulo-site.xml",
    body: r#"<?xml version="1.0" encoding="UTF-8"?>
<?xml-stylesheet type="text/xsl" href="configuration.xsl"?>
<configuration>
	<!--  Put your site-specific accumulo configurations here. -->

    <property>
      <name>instance.zookeeper.host</name>
      <value>{{master}}:2181</value>
      <description>comma separated list of zookeeper servers</description>
    </property>

    <property>
      <name>logger.dir.walog</name>
      <value>/mnt/walogs</value>
      <description>The directory used to store write-ahead logs on the local filesystem. It is possible to specify a comma-separated list of directories.</description>
    </property>
    
    <property>
      <name>instance.secret</name>
      <value>todo_convert_to_plugin_option</value>
      <description>A secret unique to a given instance that all servers must know in order to communicate with one another.</description>
    </property>

    <property>
      <name>tserver.memory.maps.max</name>
      <value>1G</value>
    </property>
    
    <property>
      <name>tserver.cache.data.size</name>
      <value>7M</value>
    </property>
    
    <property>
      <name>tserver.cache.index.size</name>
      <value>20M</value>
    </property>
    
    <property>
      <name>trace.password</name>
      <!-- 
        change this to the root user's password, and/or change the user below 
       -->
      <value>secret</value>
    </property>
    
    <property>
      <name>trace.user</name>
      <value>root</value>
    </property>
    
    <property>
      <name>logger.sort.buffer.size</name>
      <value>50M</value>
    </property>

    <property>
      <name>tserver.walog.max.size</name>
      <value>100M</value>
    </property>

    <property>
      <name>general.classpaths</name>
      <value>
    $ACCUMULO_HOME/src/server/target/classes/,
    $ACCUMULO_HOME/src/core/target/classes/,
    $ACCUMULO_HOME/src/start/target/classes/,
    $ACCUMULO_HOME/src/examples/target/classes/,
	$ACCUMULO_HOME/lib/[^.].$ACCUMULO_VERSION.jar,
	$ACCUMULO_HOME/lib/[^.].*.jar,
	$ZOOKEEPER_HOME/zookeeper[^.].*.jar,
	$HADOOP_HOME/conf,
	$HADOOP_HOME/[^.].*.jar,
	$HADOOP_HOME/lib/[^.].*.jar,
      </value>
      <description>Classpaths that accumulo checks for updates and class files.
      When using the Security Manager, please remove the ".../target/classes/" values.
      </description>
    </property>

</configuration>
"#,
    required_keys: &[MASTER_KEY],
};

/// Every template a configuration run renders
pub const ALL_TEMPLATES: [Template; 3] = [ZOO_CFG, ACCUMULO_ENV, ACCUMULO_SITE];
