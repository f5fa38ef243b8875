//! VPC, subnet and route table operations

use super::{Ec2Client, vpc_filter};
use crate::aws::tags::{ec2_scope_filters, ec2_tags, scoped_node};
use crate::provider::ProviderError;
use anyhow::{Context, Result};
use aws_sdk_ec2::types::Filter;
use ipnet::Ipv4Net;
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use tracing::{debug, info, warn};

fn parse_cidr(cidr: Option<&str>, owner: &str) -> Option<Ipv4Net> {
    let cidr = cidr?;
    match cidr.parse::<Ipv4Net>() {
        Ok(net) => Some(net),
        Err(e) => {
            warn!(owner = %owner, cidr = %cidr, error = %e, "Ignoring unparseable CIDR block");
            None
        }
    }
}

impl Ec2Client {
    pub async fn list_subnets(&self, scope: &ResourceScope) -> Result<Vec<ResourceNode>> {
        let mut pages = self
            .client
            .describe_subnets()
            .set_filters(Some(ec2_scope_filters(scope)))
            .into_paginator()
            .send();

        let mut nodes = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.context("Failed to describe subnets")?;
            for subnet in page.subnets() {
                let Some(id) = subnet.subnet_id() else {
                    continue;
                };
                let tags = ec2_tags(subnet.tags());
                if let Some(node) = scoped_node(ResourceKind::Subnet, id, &tags, scope) {
                    nodes.push(match parse_cidr(subnet.cidr_block(), id) {
                        Some(cidr) => node.with_cidr(cidr),
                        None => node,
                    });
                }
            }
        }

        debug!(scope = %scope, count = nodes.len(), "Found subnets");
        Ok(nodes)
    }

    /// CIDR blocks of every subnet in a VPC, regardless of tags
    pub async fn subnet_blocks(&self, vpc_id: &str) -> Result<Vec<Ipv4Net>> {
        let mut pages = self
            .client
            .describe_subnets()
            .filters(vpc_filter(vpc_id))
            .into_paginator()
            .send();

        let mut blocks = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.context("Failed to describe subnets")?;
            blocks.extend(
                page.subnets()
                    .iter()
                    .filter_map(|s| parse_cidr(s.cidr_block(), s.subnet_id().unwrap_or(vpc_id))),
            );
        }
        Ok(blocks)
    }

    pub async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        info!(subnet_id = %subnet_id, "Deleting subnet");
        self.client
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .context("Failed to delete subnet")?;
        Ok(())
    }

    /// Non-main route tables tagged inside `scope`
    pub async fn list_route_tables(&self, scope: &ResourceScope) -> Result<Vec<ResourceNode>> {
        let mut pages = self
            .client
            .describe_route_tables()
            .set_filters(Some(ec2_scope_filters(scope)))
            .into_paginator()
            .send();

        let mut nodes = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.context("Failed to describe route tables")?;
            for table in page.route_tables() {
                if table.associations().iter().any(|a| a.main() == Some(true)) {
                    continue;
                }
                let Some(id) = table.route_table_id() else {
                    continue;
                };
                let tags = ec2_tags(table.tags());
                nodes.extend(scoped_node(ResourceKind::RouteTable, id, &tags, scope));
            }
        }

        debug!(scope = %scope, count = nodes.len(), "Found route tables");
        Ok(nodes)
    }

    /// Disassociate a route table from its subnets, then delete it
    pub async fn delete_route_table(&self, route_table_id: &str) -> Result<()> {
        let response = self
            .client
            .describe_route_tables()
            .route_table_ids(route_table_id)
            .send()
            .await
            .context("Failed to describe route table")?;

        let Some(table) = response.route_tables().first() else {
            return Err(ProviderError::not_found(format!("route table {route_table_id}")).into());
        };

        for association in table.associations() {
            if association.main() == Some(true) {
                continue;
            }
            if let Some(association_id) = association.route_table_association_id() {
                debug!(route_table_id = %route_table_id, association_id = %association_id, "Disassociating route table");
                self.client
                    .disassociate_route_table()
                    .association_id(association_id)
                    .send()
                    .await
                    .context("Failed to disassociate route table")?;
            }
        }

        info!(route_table_id = %route_table_id, "Deleting route table");
        self.client
            .delete_route_table()
            .route_table_id(route_table_id)
            .send()
            .await
            .context("Failed to delete route table")?;
        Ok(())
    }

    pub async fn list_vpcs(&self, scope: &ResourceScope) -> Result<Vec<ResourceNode>> {
        let mut pages = self
            .client
            .describe_vpcs()
            .set_filters(Some(ec2_scope_filters(scope)))
            .into_paginator()
            .send();

        let mut nodes = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.context("Failed to describe VPCs")?;
            for vpc in page.vpcs() {
                let Some(id) = vpc.vpc_id() else {
                    continue;
                };
                let tags = ec2_tags(vpc.tags());
                if let Some(node) = scoped_node(ResourceKind::Network, id, &tags, scope) {
                    nodes.push(match parse_cidr(vpc.cidr_block(), id) {
                        Some(cidr) => node.with_cidr(cidr),
                        None => node,
                    });
                }
            }
        }

        debug!(scope = %scope, count = nodes.len(), "Found VPCs");
        Ok(nodes)
    }

    /// Primary CIDR block of a VPC
    pub async fn vpc_block(&self, vpc_id: &str) -> Result<Ipv4Net> {
        let response = self
            .client
            .describe_vpcs()
            .vpc_ids(vpc_id)
            .send()
            .await
            .context("Failed to describe VPC")?;

        let vpc = response
            .vpcs()
            .first()
            .ok_or_else(|| ProviderError::not_found(format!("VPC {vpc_id}")))?;
        let cidr = vpc
            .cidr_block()
            .context("VPC has no IPv4 CIDR block")?;
        cidr.parse()
            .with_context(|| format!("Invalid VPC CIDR block '{cidr}'"))
    }

    /// Detach and delete internet gateways, then delete the VPC
    pub async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        let gateways = self
            .client
            .describe_internet_gateways()
            .filters(
                Filter::builder()
                    .name("attachment.vpc-id")
                    .values(vpc_id)
                    .build(),
            )
            .send()
            .await
            .context("Failed to describe internet gateways")?;

        for igw in gateways.internet_gateways() {
            let Some(igw_id) = igw.internet_gateway_id() else {
                continue;
            };
            info!(vpc_id = %vpc_id, igw_id = %igw_id, "Detaching internet gateway");
            self.client
                .detach_internet_gateway()
                .internet_gateway_id(igw_id)
                .vpc_id(vpc_id)
                .send()
                .await
                .context("Failed to detach internet gateway")?;
            self.client
                .delete_internet_gateway()
                .internet_gateway_id(igw_id)
                .send()
                .await
                .context("Failed to delete internet gateway")?;
        }

        info!(vpc_id = %vpc_id, "Deleting VPC");
        self.client
            .delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .context("Failed to delete VPC")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cidr_tolerates_garbage() {
        assert_eq!(
            parse_cidr(Some("10.0.1.0/24"), "subnet-1"),
            Some("10.0.1.0/24".parse().unwrap())
        );
        assert_eq!(parse_cidr(Some("not-a-cidr"), "subnet-1"), None);
        assert_eq!(parse_cidr(None, "subnet-1"), None);
    }
}
